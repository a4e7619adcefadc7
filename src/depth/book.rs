use std::collections::{BTreeMap, HashMap};

use super::LobSnapshot;
use crate::{
    backtest::BacktestError,
    types::{MsgType, Order, OrderId, PriceTable, Side},
};

/// Limit order book reconstructed from the historical message stream.
///
/// Orders are tracked individually by id while the per-side depth is
/// aggregated into tick-keyed maps, so the best levels come out of the
/// `BTreeMap` ordering for free. Prices are converted to ticks with
/// `(price / tick_size).round()`; the tick size therefore has to divide every
/// price on the feed.
pub struct LimitOrderBook {
    pub asset: String,
    pub tick_size: f64,
    /// Every resting historical order, keyed by id.
    pub orders: HashMap<OrderId, Order>,
    /// Aggregate bid quantity per price tick.
    pub bid_depth: BTreeMap<i64, i64>,
    /// Aggregate ask quantity per price tick.
    pub ask_depth: BTreeMap<i64, i64>,
    /// Network instant of the message processed most recently.
    pub last_timestamp: Option<i64>,
    /// Wire forms of the messages processed since the previous snapshot.
    mold_package: Vec<String>,
    /// Every snapshot produced so far, in order.
    pub snapshots: Vec<LobSnapshot>,
    pub price_table: PriceTable,
}

impl LimitOrderBook {
    /// Constructs an empty `LimitOrderBook` for the given asset.
    pub fn new(asset: String, tick_size: f64) -> Self {
        Self {
            asset,
            tick_size,
            orders: HashMap::new(),
            bid_depth: BTreeMap::new(),
            ask_depth: BTreeMap::new(),
            last_timestamp: None,
            mold_package: Vec::new(),
            snapshots: Vec::new(),
            price_table: PriceTable::default(),
        }
    }

    #[inline]
    fn price_tick(&self, price: f64) -> i64 {
        (price / self.tick_size).round() as i64
    }

    #[inline]
    fn tick_price(&self, tick: i64) -> f64 {
        tick as f64 * self.tick_size
    }

    /// Applies a historical message to the book.
    ///
    /// If the message opens a new network instant, the state accumulated for
    /// the previous instant is first emitted as a snapshot and `true` is
    /// returned. The incoming message is rewritten in place for `D` and `E`:
    /// its price (and for `D` also its quantity) is taken from the resting
    /// record, so downstream consumers see the real figures.
    pub fn process(&mut self, order: &mut Order) -> Result<bool, BacktestError> {
        let mut snapshot_created = false;
        if let Some(last) = self.last_timestamp {
            if last != order.network_time {
                self.create_snapshot();
                snapshot_created = true;
            }
        }
        self.last_timestamp = Some(order.network_time);

        match order.msg_type {
            MsgType::Add => self.process_add(order),
            MsgType::Delete => self.process_delete(order)?,
            _ => self.process_execute(order)?,
        }
        self.mold_package.push(order.to_string());

        Ok(snapshot_created)
    }

    fn process_add(&mut self, order: &Order) {
        self.orders.insert(order.order_id, order.clone());

        let tick = self.price_tick(order.price);
        let depth = match order.side {
            Side::Buy => &mut self.bid_depth,
            Side::Sell => &mut self.ask_depth,
        };
        *depth.entry(tick).or_insert(0) += order.quantity;
    }

    fn process_delete(&mut self, order: &mut Order) -> Result<(), BacktestError> {
        let deleted = self
            .orders
            .remove(&order.order_id)
            .ok_or(BacktestError::OrderNotFound)?;
        order.quantity = deleted.quantity;
        order.price = deleted.price;

        let tick = self.price_tick(order.price);
        subtract_level(self.side_depth_mut(order.side), tick, order.quantity)
    }

    fn process_execute(&mut self, order: &mut Order) -> Result<(), BacktestError> {
        let target = self
            .orders
            .get_mut(&order.order_id)
            .ok_or(BacktestError::OrderNotFound)?;
        target.quantity -= order.quantity;
        order.price = target.price;
        if target.quantity == 0 {
            self.orders.remove(&order.order_id);
        }

        let tick = self.price_tick(order.price);
        subtract_level(self.side_depth_mut(order.side), tick, order.quantity)?;

        match order.side {
            Side::Buy => self.price_table.last_bid = Some(order.price),
            Side::Sell => self.price_table.last_ask = Some(order.price),
        }
        Ok(())
    }

    fn side_depth_mut(&mut self, side: Side) -> &mut BTreeMap<i64, i64> {
        match side {
            Side::Buy => &mut self.bid_depth,
            Side::Sell => &mut self.ask_depth,
        }
    }

    /// Emits a snapshot of the current state stamped with the current network
    /// instant, unless nothing has been processed since the previous one.
    pub fn create_snapshot(&mut self) {
        if self.mold_package.is_empty() {
            return;
        }
        let snapshot = LobSnapshot {
            timestamp: self.last_timestamp.unwrap_or_default(),
            asset: self.asset.clone(),
            bids: self.sorted_bids(),
            asks: self.sorted_asks(),
            mold_package: self.mold_package.join(";"),
        };
        self.snapshots.push(snapshot);
        self.mold_package.clear();
    }

    /// Recomputes `best_bid`, `best_ask` and `mid` from the book. The sticky
    /// `last_bid`/`last_ask` are left untouched, and nothing changes while
    /// either side of the book is empty.
    pub fn update_price_table(&mut self) {
        if let (Some((&bid_tick, _)), Some((&ask_tick, _))) = (
            self.bid_depth.last_key_value(),
            self.ask_depth.first_key_value(),
        ) {
            let best_bid = self.tick_price(bid_tick);
            let best_ask = self.tick_price(ask_tick);
            self.price_table.best_bid = Some(best_bid);
            self.price_table.best_ask = Some(best_ask);
            self.price_table.mid = Some((best_bid + best_ask) / 2.0);
        }
    }

    /// Returns the bid levels ordered worst-first, so the last element is the
    /// best bid and `pop()` on the result yields the best level first.
    pub fn sorted_bids(&self) -> Vec<(f64, i64)> {
        self.bid_depth
            .iter()
            .map(|(&tick, &qty)| (self.tick_price(tick), qty))
            .collect()
    }

    /// Returns the ask levels ordered worst-first (descending by price), so
    /// the last element is the best ask.
    pub fn sorted_asks(&self) -> Vec<(f64, i64)> {
        self.ask_depth
            .iter()
            .rev()
            .map(|(&tick, &qty)| (self.tick_price(tick), qty))
            .collect()
    }
}

/// Removes `qty` from the level at `tick`, dropping the entry when it is
/// consumed entirely so that absent prices never linger as zero entries.
fn subtract_level(
    depth: &mut BTreeMap<i64, i64>,
    tick: i64,
    qty: i64,
) -> Result<(), BacktestError> {
    let level = depth.get_mut(&tick).ok_or(BacktestError::LevelNotFound)?;
    if *level == qty {
        depth.remove(&tick);
    } else {
        *level -= qty;
    }
    Ok(())
}
