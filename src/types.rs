use std::fmt::{Display, Formatter};

use serde::Serialize;
use thiserror::Error;

use crate::depth::LobSnapshot;

/// Unique identifier of an order message, stable across its lifecycle.
pub type OrderId = u64;

/// Message type of an order-book message.
///
/// The wire codes follow the exchange feed: `A` adds a resting order, `D`
/// deletes one, `E` executes (part of) one, and `C` is a cancel request sent
/// by the agent towards the exchange.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize)]
#[repr(u8)]
pub enum MsgType {
    Add,
    Delete,
    Execute,
    CancelReq,
}

impl AsRef<str> for MsgType {
    fn as_ref(&self) -> &'static str {
        match self {
            MsgType::Add => "A",
            MsgType::Delete => "D",
            MsgType::Execute => "E",
            MsgType::CancelReq => "C",
        }
    }
}

/// Represents a side, which refers to either the side of an order or the side
/// of the book an execution took place on.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize)]
#[repr(i8)]
pub enum Side {
    /// The bid side.
    Buy = 1,
    /// The ask side.
    Sell = -1,
}

impl AsRef<str> for Side {
    fn as_ref(&self) -> &'static str {
        match self {
            Side::Buy => "B",
            Side::Sell => "S",
        }
    }
}

/// Formats a price the way the feed renders it: integral values keep a single
/// trailing decimal (`10` becomes `10.0`), everything else uses the shortest
/// round-trip form.
pub(crate) fn display_price(px: f64) -> String {
    if px.is_finite() && px.fract() == 0.0 {
        format!("{px:.1}")
    } else {
        format!("{px}")
    }
}

/// A single order-book message.
///
/// The same record is used for historical messages replayed from the feed,
/// for the agent's own requests, and for the synthetic responses the
/// simulated exchange sends back.
#[derive(Clone, Debug, Serialize)]
pub struct Order {
    /// The time at which the network edge observes or sends this message.
    pub network_time: i64,
    /// The time at which the exchange observes or sends this message.
    pub bist_time: i64,
    pub msg_type: MsgType,
    /// Ticker symbol of the asset this message belongs to.
    pub asset: String,
    pub side: Side,
    pub price: f64,
    pub quantity: i64,
    pub order_id: OrderId,
}

impl Order {
    /// Compares two orders by `(price, bist_time)` ascending, the book's
    /// price-time priority.
    pub fn cmp_price_time(&self, other: &Order) -> std::cmp::Ordering {
        self.price
            .total_cmp(&other.price)
            .then_with(|| self.bist_time.cmp(&other.bist_time))
    }
}

/// Order identity is its id; the remaining fields describe one point of its
/// lifecycle.
impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.order_id == other.order_id
    }
}

impl Display for Order {
    /// The stable wire form used inside mold packages:
    /// `"<msg_type>-<side>-<price>-<quantity>-<order_id>"`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.msg_type.as_ref(),
            self.side.as_ref(),
            display_price(self.price),
            self.quantity,
            self.order_id
        )
    }
}

/// The agent's balance sheet.
///
/// `held_money` collateralizes the agent's live bids at their limit price and
/// `held_stock` collateralizes its live asks; the free portions only change
/// when an order is admitted, released, or filled.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize)]
pub struct Balance {
    pub money: f64,
    pub stock: i64,
    pub held_money: f64,
    pub held_stock: i64,
}

impl Balance {
    /// Constructs a `Balance` with the given free money and stock.
    pub fn new(money: f64, stock: i64) -> Self {
        Self {
            money,
            stock,
            held_money: 0.0,
            held_stock: 0,
        }
    }
}

/// Running price summary of the reconstructed book.
///
/// `best_bid`, `best_ask` and `mid` are refreshed from the book; `last_bid`
/// and `last_ask` are sticky and advance only on historical executions.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize)]
pub struct PriceTable {
    pub mid: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub last_bid: Option<f64>,
    pub last_ask: Option<f64>,
}

/// Provides the trading-agent interface the backtester drives.
///
/// The backtester hands the agent each newly produced book snapshot exactly
/// once, in timestamp order, together with a read-only view of its balance.
/// The agent answers with zero or more add (`A`) or cancel (`C`) requests.
/// Add orders should carry `network_time = book.timestamp`,
/// `bist_time = book.timestamp + latency` and a self-assigned unique id.
pub trait Agent {
    fn strategy(&mut self, book: &LobSnapshot, balance: &Balance, latency: i64) -> Vec<Order>;
}

/// Provides errors that can occur while assembling a backtest.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("`{0}` is required")]
    BuilderIncomplete(&'static str),
    #[error("{0}")]
    InvalidArgument(&'static str),
    #[error("strategy `{0}` is not found")]
    StrategyNotFound(String),
    #[error("{0:?}")]
    Error(#[from] anyhow::Error),
}
