//! # BistBacktest
//!
//! This Rust framework replays a historical Borsa Istanbul order-message
//! stream against a reconstructed limit order book while simulating a trading
//! agent whose orders enter the same matching engine through a bidirectional
//! network channel with configurable one-way latency. Per simulated instant
//! it produces the book state, the agent's cash/stock balance including held
//! amounts, and a trace of every message the agent exchanged with the
//! exchange.
//!
//! ## Key features
//! - Full order book reconstruction from a Market-By-Order message feed.
//! - Deterministic single-clock simulation interleaving the historical feed
//!   and both directions of the agent's order traffic by timestamp.
//! - Order fill simulation crossing the agent's resting orders against the
//!   displayed public depth, with price-improvement accounting.
//! - Balance tracking that splits money and stock into free and held
//!   portions collateralizing the agent's open orders.
//! - Snapshot export and per-instant balance/price history recording.

/// Provides backtesting features: the event scheduler, the matching engine,
/// the accountant and the history recorder.
pub mod backtest;

/// Provides access to the historical order data.
pub mod data;

/// Provides the limit order book and its snapshots.
pub mod depth;

/// Provides common types.
pub mod prelude;

/// Provides the built-in trading strategies.
pub mod strategies;

/// Defines BistBacktest types.
pub mod types;
