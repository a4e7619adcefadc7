use std::{io::Error as IoError, path::PathBuf};

use thiserror::Error;
use tracing::info;

pub use crate::backtest::{
    bus::OrderBus,
    recorder::{BasePrice, HistoryRecorder, total_balance},
    state::State,
};
use crate::{
    data::OrderReader,
    depth::{LimitOrderBook, write_snapshots_csv},
    types::{Agent, Balance, BuildError, MsgType, Order},
};

pub mod bus;
pub mod recorder;
pub mod state;

mod maker;

/// Errors that can occur during backtesting.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("order not found")]
    OrderNotFound,
    #[error("price level not found in the book")]
    LevelNotFound,
    #[error("message type {0:?} is invalid for this queue")]
    InvalidQueueMessage(MsgType),
    #[error("data error: {0:?}")]
    DataError(#[from] IoError),
}

/// The queue an event was drawn from. Declaration order is the tie-break
/// order when several queues share the earliest timestamp.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum EventSource {
    /// The historical feed.
    Feed,
    /// Agent requests travelling towards the exchange.
    LocalToExch,
    /// Exchange responses travelling back to the agent.
    ExchToLocal,
}

/// [`Backtest`] builder.
pub struct BacktestBuilder {
    agent: Option<Box<dyn Agent>>,
    reader: Option<(OrderReader, String)>,
    filepath: Option<PathBuf>,
    latency: f64,
    order_cost: f64,
    initial_money: f64,
    initial_stock: i64,
    tick_size: f64,
}

impl BacktestBuilder {
    /// Constructs a `BacktestBuilder` with the default balance of 10000 money
    /// units, no stock, free orders, zero latency and a tick size of 0.01.
    pub fn new() -> Self {
        Self {
            agent: None,
            reader: None,
            filepath: None,
            latency: 0.0,
            order_cost: 0.0,
            initial_money: 10000.0,
            initial_stock: 0,
            tick_size: 0.01,
        }
    }

    /// Sets the trading agent.
    pub fn agent(self, agent: Box<dyn Agent>) -> Self {
        Self {
            agent: Some(agent),
            ..self
        }
    }

    /// Sets the historical order data file. The file stem names the asset.
    pub fn file<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            filepath: Some(path.into()),
            ..self
        }
    }

    /// Sets an already opened order stream together with the asset name it
    /// belongs to. Takes precedence over [`file`](Self::file).
    pub fn reader(self, reader: OrderReader, asset: &str) -> Self {
        Self {
            reader: Some((reader, asset.to_string())),
            ..self
        }
    }

    /// Sets the one-way latency between the network edge and the exchange, in
    /// seconds. Negative values are clamped to zero.
    pub fn latency(self, latency: f64) -> Self {
        Self { latency, ..self }
    }

    /// Sets the fee charged per order the strategy submits.
    pub fn order_cost(self, order_cost: f64) -> Self {
        Self { order_cost, ..self }
    }

    /// Sets the agent's starting money.
    pub fn initial_money(self, initial_money: f64) -> Self {
        Self {
            initial_money,
            ..self
        }
    }

    /// Sets the agent's starting stock.
    pub fn initial_stock(self, initial_stock: i64) -> Self {
        Self {
            initial_stock,
            ..self
        }
    }

    /// Sets the price tick size of the asset.
    pub fn tick_size(self, tick_size: f64) -> Self {
        Self { tick_size, ..self }
    }

    /// Builds a [`Backtest`].
    pub fn build(self) -> Result<Backtest, BuildError> {
        let agent = self.agent.ok_or(BuildError::BuilderIncomplete("agent"))?;
        let (reader, asset) = match (self.reader, self.filepath) {
            (Some((reader, asset)), _) => (reader, asset),
            (None, Some(path)) => {
                let reader = OrderReader::from_file(&path)
                    .map_err(|err| BuildError::Error(err.into()))?;
                let asset = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .ok_or(BuildError::InvalidArgument("filepath has no file stem"))?;
                (reader, asset)
            }
            (None, None) => return Err(BuildError::BuilderIncomplete("file")),
        };
        if self.tick_size <= 0.0 {
            return Err(BuildError::InvalidArgument("tick_size must be positive"));
        }

        Ok(Backtest {
            agent,
            reader,
            book: LimitOrderBook::new(asset, self.tick_size),
            state: State::new(self.order_cost, self.initial_money, self.initial_stock),
            recorder: HistoryRecorder::new(),
            feed: OrderBus::new(),
            order_l2e: OrderBus::new(),
            order_e2l: OrderBus::new(),
            test_timeline: Vec::new(),
            last_timestamp: None,
            latency: (self.latency.max(0.0) * 1e9).round() as i64,
        })
    }
}

impl Default for BacktestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Discrete-event backtester replaying a historical order-message stream
/// against a reconstructed limit order book while simulating a trading agent
/// whose orders reach the same book through a latency-delayed channel.
///
/// One logical clock is defined by the timestamps on the messages; the three
/// queues are drained strictly by the `network_time` of their front entries,
/// with ties breaking in favor of the historical feed, then the agent's
/// outgoing requests, then the exchange's responses.
pub struct Backtest {
    agent: Box<dyn Agent>,
    reader: OrderReader,
    pub(crate) book: LimitOrderBook,
    pub(crate) state: State,
    pub(crate) recorder: HistoryRecorder,
    feed: OrderBus,
    pub(crate) order_l2e: OrderBus,
    pub(crate) order_e2l: OrderBus,
    test_timeline: Vec<String>,
    /// Exchange instant of the historical message processed most recently.
    pub(crate) last_timestamp: Option<i64>,
    /// One-way latency in nanoseconds.
    pub(crate) latency: i64,
}

impl Backtest {
    /// Returns a [`BacktestBuilder`].
    pub fn builder() -> BacktestBuilder {
        BacktestBuilder::new()
    }

    /// Runs the backtest until the historical stream and all queues are
    /// drained.
    pub fn run(&mut self) -> Result<(), BacktestError> {
        info!(asset = %self.book.asset, latency = self.latency, "starting backtest");
        loop {
            match self.next_event() {
                None => {
                    self.finalize();
                    break;
                }
                Some((EventSource::Feed, order)) => self.process_feed(order)?,
                Some((EventSource::LocalToExch, order)) => self.process_send_order(order)?,
                Some((EventSource::ExchToLocal, order)) => self.process_recv_order(order)?,
            }
        }
        info!(
            snapshots = self.book.snapshots.len(),
            samples = self.recorder.len(),
            "backtest finished"
        );
        Ok(())
    }

    /// Pops the message with the minimum `network_time` across the three
    /// queues, refilling the feed queue from the reader first. Returns `None`
    /// once everything is drained.
    fn next_event(&mut self) -> Option<(EventSource, Order)> {
        self.refill_feed();

        let earliest = [
            self.feed.earliest_timestamp(),
            self.order_l2e.earliest_timestamp(),
            self.order_e2l.earliest_timestamp(),
        ];
        let mut source: Option<(usize, i64)> = None;
        for (no, timestamp) in earliest.into_iter().enumerate() {
            if let Some(timestamp) = timestamp {
                // Strict comparison keeps the earliest queue on ties.
                if source.map_or(true, |(_, earliest)| timestamp < earliest) {
                    source = Some((no, timestamp));
                }
            }
        }

        match source?.0 {
            0 => self.feed.pop_front().map(|o| (EventSource::Feed, o)),
            1 => self
                .order_l2e
                .pop_front()
                .map(|o| (EventSource::LocalToExch, o)),
            _ => self
                .order_e2l
                .pop_front()
                .map(|o| (EventSource::ExchToLocal, o)),
        }
    }

    /// Reads ahead one historical order, skipping unparseable lines, unless
    /// one is already waiting.
    fn refill_feed(&mut self) {
        if !self.feed.is_empty() {
            return;
        }
        while self.reader.is_open() {
            if let Some(order) = self.reader.next_order() {
                self.feed.append(order);
                break;
            }
        }
    }

    /// Applies a historical message.
    ///
    /// Entering a new exchange instant first closes out the previous one:
    /// the price table is refreshed, a history sample is recorded, and the
    /// matching engine crosses the agent's resting orders against the book as
    /// it stood. If processing the message produced a snapshot, the agent is
    /// invoked on it and its requests are charged and enqueued.
    fn process_feed(&mut self, mut order: Order) -> Result<(), BacktestError> {
        if let Some(last) = self.last_timestamp {
            if last != order.bist_time {
                self.book.update_price_table();
                self.recorder
                    .record(Some(last), &self.state.balance, &self.book.price_table);
                self.run_market_maker();
            }
        }
        self.last_timestamp = Some(order.bist_time);

        if self.book.process(&mut order)? {
            self.run_agent();
        }
        Ok(())
    }

    /// Hands the most recent snapshot to the agent and enqueues its requests.
    fn run_agent(&mut self) {
        if let Some(snapshot) = self.book.snapshots.last() {
            let orders = self
                .agent
                .strategy(snapshot, &self.state.balance, self.latency);
            self.state.apply_order_cost(orders.len());
            for order in orders {
                self.order_l2e.append(order);
            }
        }
    }

    /// Applies an agent request arriving at the exchange. Only add and
    /// cancel requests are valid on this queue.
    fn process_send_order(&mut self, order: Order) -> Result<(), BacktestError> {
        self.test_timeline.push(order.to_string());
        match order.msg_type {
            MsgType::Add => {
                self.state.apply_add(order);
                Ok(())
            }
            MsgType::CancelReq => {
                if let Some(delete) = self.state.apply_cancel(order, self.latency) {
                    self.order_e2l.append(delete);
                }
                Ok(())
            }
            msg_type => Err(BacktestError::InvalidQueueMessage(msg_type)),
        }
    }

    /// Applies an exchange response arriving back at the agent. Only delete
    /// confirmations and executions are valid on this queue.
    fn process_recv_order(&mut self, order: Order) -> Result<(), BacktestError> {
        self.test_timeline.push(order.to_string());
        match order.msg_type {
            MsgType::Delete => {
                self.state.apply_delete(&order);
                Ok(())
            }
            MsgType::Execute => self.state.apply_fill(&order),
            msg_type => Err(BacktestError::InvalidQueueMessage(msg_type)),
        }
    }

    /// Closes out the run: refreshes the price table, flushes the in-progress
    /// snapshot, records the terminal history sample and gives the matching
    /// engine one last pass.
    fn finalize(&mut self) {
        self.book.update_price_table();
        self.book.create_snapshot();
        self.recorder
            .record(self.last_timestamp, &self.state.balance, &self.book.price_table);
        self.run_market_maker();
    }

    /// Returns the agent's balance.
    pub fn balance(&self) -> &Balance {
        &self.state.balance
    }

    /// Returns the reconstructed book.
    pub fn book(&self) -> &LimitOrderBook {
        &self.book
    }

    /// Returns the accountant state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the recorded history.
    pub fn recorder(&self) -> &HistoryRecorder {
        &self.recorder
    }

    /// Returns the wire forms of every message the agent exchanged with the
    /// exchange, in processing order.
    pub fn test_timeline(&self) -> &[String] {
        &self.test_timeline
    }

    /// Writes every snapshot produced during the run to a CSV file.
    pub fn export_lob<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), IoError> {
        write_snapshots_csv(&self.book.snapshots, path)
    }
}
