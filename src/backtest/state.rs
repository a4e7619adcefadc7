use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::{
    backtest::BacktestError,
    types::{Balance, MsgType, Order, OrderId, Side},
};

/// Holds the agent's balance and open test orders, and applies the effects of
/// every admitted, cancelled, or filled order to them.
///
/// Money and stock are split into a free and a held portion: admitting a bid
/// moves `price * quantity` from `money` into `held_money`, admitting an ask
/// moves `quantity` from `stock` into `held_stock`, and fills or cancel
/// confirmations release the held amounts again.
#[derive(Debug)]
pub struct State {
    pub balance: Balance,
    /// Fee charged per order returned by the strategy, admitted or not.
    pub order_cost: f64,
    /// Live test orders, keyed by id, with their remaining quantity.
    pub test_orders: HashMap<OrderId, Order>,
    /// Ids of test orders that have been fully executed.
    pub finished_orders: HashSet<OrderId>,
}

impl State {
    /// Constructs a `State` with the given starting balance.
    pub fn new(order_cost: f64, initial_money: f64, initial_stock: i64) -> Self {
        Self {
            balance: Balance::new(initial_money, initial_stock),
            order_cost,
            test_orders: HashMap::new(),
            finished_orders: HashSet::new(),
        }
    }

    /// Charges the per-order fee for `count` submitted orders. This is the
    /// only way the free money can go negative.
    pub fn apply_order_cost(&mut self, count: usize) {
        self.balance.money -= self.order_cost * count as f64;
    }

    /// Admits an add request, reserving the collateral it needs.
    ///
    /// A request the balance cannot cover is dropped silently: the exchange
    /// rejects it at the gateway and no acknowledgement reaches the agent.
    pub fn apply_add(&mut self, order: Order) {
        match order.side {
            Side::Buy => {
                let need = order.price * order.quantity as f64;
                if need > self.balance.money {
                    debug!(order_id = order.order_id, need, "dropping bid, insufficient money");
                    return;
                }
                self.balance.money -= need;
                self.balance.held_money += need;
            }
            Side::Sell => {
                if order.quantity > self.balance.stock {
                    debug!(order_id = order.order_id, "dropping ask, insufficient stock");
                    return;
                }
                self.balance.stock -= order.quantity;
                self.balance.held_stock += order.quantity;
            }
        }
        self.test_orders.insert(order.order_id, order);
    }

    /// Handles a cancel request.
    ///
    /// Removes the order from the live set and rewrites the request into the
    /// delete confirmation the exchange sends back, carrying the resting
    /// price and quantity and arriving one latency later. A cancel for an id
    /// that is no longer live (already filled or cancelled) is a no-op.
    pub fn apply_cancel(&mut self, mut order: Order, latency: i64) -> Option<Order> {
        let cancelled = self.test_orders.remove(&order.order_id)?;

        order.msg_type = MsgType::Delete;
        order.network_time = order.bist_time + latency;
        order.quantity = cancelled.quantity;
        order.price = cancelled.price;
        Some(order)
    }

    /// Applies a delete confirmation, releasing the held collateral.
    pub fn apply_delete(&mut self, order: &Order) {
        match order.side {
            Side::Buy => {
                let total = order.price * order.quantity as f64;
                self.balance.money += total;
                self.balance.held_money -= total;
            }
            Side::Sell => {
                self.balance.stock += order.quantity;
                self.balance.held_stock -= order.quantity;
            }
        }
    }

    /// Applies an execution to the resting test order.
    ///
    /// For a bid the collateral was reserved at the limit price, so any price
    /// improvement (`resting.price - order.price`) flows back into the free
    /// money. An execution for an unknown id means the accountant and the
    /// matching engine have diverged and is fatal.
    pub fn apply_fill(&mut self, order: &Order) -> Result<(), BacktestError> {
        let resting = self
            .test_orders
            .get_mut(&order.order_id)
            .ok_or(BacktestError::OrderNotFound)?;
        let exec_qty = resting.quantity.min(order.quantity);
        let cash = order.price * exec_qty as f64;

        match order.side {
            Side::Buy => {
                let expected = resting.price * exec_qty as f64;
                self.balance.held_money -= expected;
                self.balance.stock += exec_qty;
                self.balance.money += expected - cash;
            }
            Side::Sell => {
                self.balance.money += cash;
                self.balance.held_stock -= exec_qty;
            }
        }

        if resting.quantity == exec_qty {
            self.finished_orders.insert(order.order_id);
            self.test_orders.remove(&order.order_id);
        } else {
            resting.quantity -= exec_qty;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(msg_type: MsgType, side: Side, price: f64, quantity: i64, order_id: u64) -> Order {
        Order {
            network_time: 100,
            bist_time: 110,
            msg_type,
            asset: "X".to_string(),
            side,
            price,
            quantity,
            order_id,
        }
    }

    #[test]
    fn admitting_a_bid_reserves_money() {
        let mut state = State::new(0.0, 1000.0, 0);
        state.apply_add(order(MsgType::Add, Side::Buy, 9.0, 10, 5));

        assert_eq!(state.balance.money, 910.0);
        assert_eq!(state.balance.held_money, 90.0);
        assert!(state.test_orders.contains_key(&5));
    }

    #[test]
    fn unaffordable_orders_are_dropped_silently() {
        let mut state = State::new(0.0, 50.0, 3);
        state.apply_add(order(MsgType::Add, Side::Buy, 9.0, 10, 1));
        state.apply_add(order(MsgType::Add, Side::Sell, 9.0, 10, 2));

        assert_eq!(state.balance, Balance::new(50.0, 3));
        assert!(state.test_orders.is_empty());
    }

    #[test]
    fn cancel_rewrites_into_a_delayed_delete() {
        let mut state = State::new(0.0, 1000.0, 0);
        state.apply_add(order(MsgType::Add, Side::Buy, 9.0, 10, 5));

        let cancel = order(MsgType::CancelReq, Side::Buy, 0.0, 0, 5);
        let delete = state.apply_cancel(cancel, 7).unwrap();

        assert_eq!(delete.msg_type, MsgType::Delete);
        assert_eq!(delete.network_time, 117);
        assert_eq!(delete.price, 9.0);
        assert_eq!(delete.quantity, 10);
        assert!(state.test_orders.is_empty());

        // Applying the confirmation releases the collateral in full.
        state.apply_delete(&delete);
        assert_eq!(state.balance, Balance::new(1000.0, 0));
    }

    #[test]
    fn cancel_for_a_retired_id_is_a_no_op() {
        let mut state = State::new(0.0, 1000.0, 0);
        assert!(state
            .apply_cancel(order(MsgType::CancelReq, Side::Buy, 0.0, 0, 9), 7)
            .is_none());
    }

    #[test]
    fn fill_refunds_price_improvement() {
        let mut state = State::new(0.0, 1200.0, 0);
        state.apply_add(order(MsgType::Add, Side::Buy, 12.0, 100, 7));
        assert_eq!(state.balance.held_money, 1200.0);

        // 40 shares touched at 11.0, the remaining 60 at the limit.
        state
            .apply_fill(&order(MsgType::Execute, Side::Buy, 11.0, 40, 7))
            .unwrap();
        state
            .apply_fill(&order(MsgType::Execute, Side::Buy, 12.0, 60, 7))
            .unwrap();

        assert_eq!(state.balance.held_money, 0.0);
        assert_eq!(state.balance.stock, 100);
        assert_eq!(state.balance.money, 40.0);
        assert!(state.finished_orders.contains(&7));
        assert!(!state.test_orders.contains_key(&7));
    }

    #[test]
    fn partial_fill_keeps_the_residual_resting() {
        let mut state = State::new(0.0, 0.0, 100);
        state.apply_add(order(MsgType::Add, Side::Sell, 10.0, 100, 3));

        state
            .apply_fill(&order(MsgType::Execute, Side::Sell, 10.0, 30, 3))
            .unwrap();

        assert_eq!(state.balance.money, 300.0);
        assert_eq!(state.balance.held_stock, 70);
        assert_eq!(state.test_orders[&3].quantity, 70);
        assert!(!state.finished_orders.contains(&3));
    }

    #[test]
    fn fill_for_an_unknown_id_is_fatal() {
        let mut state = State::new(0.0, 0.0, 0);
        let err = state
            .apply_fill(&order(MsgType::Execute, Side::Buy, 10.0, 1, 77))
            .unwrap_err();
        assert!(matches!(err, BacktestError::OrderNotFound));
    }

    #[test]
    fn order_cost_is_the_only_path_below_zero() {
        let mut state = State::new(1.5, 2.0, 0);
        state.apply_order_cost(2);
        assert_eq!(state.balance.money, -1.0);
    }
}
