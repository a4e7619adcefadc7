use super::Backtest;
use crate::types::{MsgType, Order, Side};

/// The simulated matching engine.
///
/// Whenever the book's exchange instant advances, the agent's resting test
/// orders are crossed against the reconstructed public depth as if the
/// exchange had just re-evaluated the book. The sweeps only emit synthetic
/// execution messages into the exchange-to-agent bus; the public book itself
/// is never mutated, and the resting test orders only shrink once those
/// executions are delivered and accounted.
impl Backtest {
    pub(crate) fn run_market_maker(&mut self) {
        self.run_bid_sweep();
        self.run_ask_sweep();
    }

    /// Crosses the agent's live bids, best first, against the public asks.
    fn run_bid_sweep(&mut self) {
        let mut bids: Vec<Order> = self
            .state
            .test_orders
            .values()
            .filter(|o| o.side == Side::Buy && !self.state.finished_orders.contains(&o.order_id))
            .cloned()
            .collect();
        // Best price first; price-time priority, then id, breaks ties
        // deterministically.
        bids.sort_by(|a, b| {
            b.price
                .total_cmp(&a.price)
                .then_with(|| a.bist_time.cmp(&b.bist_time))
                .then_with(|| a.order_id.cmp(&b.order_id))
        });

        let mut levels = self.book.sorted_asks();
        for bid in bids {
            if levels.is_empty() {
                break;
            }
            if self.fill_bid(bid, &mut levels) {
                // The remaining bids are even less aggressive; they get
                // retried at the next instant.
                break;
            }
        }
    }

    /// Walks one bid down the ask levels, emitting an execution per touched
    /// level. Returns `true` once a level no longer crosses, which aborts the
    /// whole sweep.
    fn fill_bid(&mut self, mut bid: Order, levels: &mut Vec<(f64, i64)>) -> bool {
        let timestamp = self.last_timestamp.unwrap_or_default();
        let mut stopped = false;
        let mut px = 0.0;
        let mut level_qty = 0i64;

        while !levels.is_empty() && bid.quantity > 0 {
            if level_qty == 0 {
                let (next_px, next_qty) = levels.pop().unwrap();
                px = next_px;
                level_qty = next_qty;
            }
            if bid.price < px {
                stopped = true;
                break;
            }

            let exec_qty = bid.quantity.min(level_qty);
            level_qty -= exec_qty;
            bid.quantity -= exec_qty;

            self.order_e2l.append(Order {
                network_time: timestamp + self.latency,
                bist_time: timestamp,
                msg_type: MsgType::Execute,
                asset: bid.asset.clone(),
                side: Side::Buy,
                price: px,
                quantity: exec_qty,
                order_id: bid.order_id,
            });
        }

        // Let the next bid continue from the partially consumed level.
        if level_qty > 0 {
            levels.push((px, level_qty));
        }
        if bid.quantity == 0 {
            self.state.finished_orders.insert(bid.order_id);
        }
        stopped
    }

    /// Crosses the agent's live asks, best first, against the public bids.
    fn run_ask_sweep(&mut self) {
        let mut asks: Vec<Order> = self
            .state
            .test_orders
            .values()
            .filter(|o| o.side == Side::Sell && !self.state.finished_orders.contains(&o.order_id))
            .cloned()
            .collect();
        asks.sort_by(|a, b| a.cmp_price_time(b).then_with(|| a.order_id.cmp(&b.order_id)));

        let mut levels = self.book.sorted_bids();
        for ask in asks {
            if levels.is_empty() {
                break;
            }
            if self.fill_ask(ask, &mut levels) {
                break;
            }
        }
    }

    /// Mirror of [`fill_bid`](Self::fill_bid) for one ask against the bid
    /// levels. The emitted execution carries the ask's limit price rather
    /// than the touched level.
    fn fill_ask(&mut self, mut ask: Order, levels: &mut Vec<(f64, i64)>) -> bool {
        let timestamp = self.last_timestamp.unwrap_or_default();
        let mut stopped = false;
        let mut px = 0.0;
        let mut level_qty = 0i64;

        while !levels.is_empty() && ask.quantity > 0 {
            if level_qty == 0 {
                let (next_px, next_qty) = levels.pop().unwrap();
                px = next_px;
                level_qty = next_qty;
            }
            if ask.price > px {
                stopped = true;
                break;
            }

            let exec_qty = ask.quantity.min(level_qty);
            level_qty -= exec_qty;
            ask.quantity -= exec_qty;

            self.order_e2l.append(Order {
                network_time: timestamp + self.latency,
                bist_time: timestamp,
                msg_type: MsgType::Execute,
                asset: ask.asset.clone(),
                side: Side::Sell,
                price: ask.price,
                quantity: exec_qty,
                order_id: ask.order_id,
            });
        }

        if level_qty > 0 {
            levels.push((px, level_qty));
        }
        if ask.quantity == 0 {
            self.state.finished_orders.insert(ask.order_id);
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::OrderReader,
        types::{Agent, Balance},
    };

    struct NoopAgent;

    impl Agent for NoopAgent {
        fn strategy(
            &mut self,
            _book: &crate::depth::LobSnapshot,
            _balance: &Balance,
            _latency: i64,
        ) -> Vec<Order> {
            vec![]
        }
    }

    fn backtest_with_book(lines: &str) -> Backtest {
        let mut bt = Backtest::builder()
            .agent(Box::new(NoopAgent))
            .reader(OrderReader::from_string(lines), "X")
            .build()
            .unwrap();
        // Drain the feed so the book is populated, then run sweeps by hand.
        bt.run().unwrap();
        bt
    }

    fn resting(side: Side, price: f64, quantity: i64, order_id: u64) -> Order {
        Order {
            network_time: 0,
            bist_time: 0,
            msg_type: MsgType::Add,
            asset: "X".to_string(),
            side,
            price,
            quantity,
            order_id,
        }
    }

    fn drain_executions(bt: &mut Backtest) -> Vec<Order> {
        let mut out = Vec::new();
        while let Some(order) = bt.order_e2l.pop_front() {
            out.push(order);
        }
        out
    }

    #[test]
    fn bid_executes_at_the_touched_level() {
        let mut bt = backtest_with_book("1,1,A,X,S,10.0,0,50,1\n");
        bt.state
            .test_orders
            .insert(999, resting(Side::Buy, 10.0, 30, 999));
        bt.last_timestamp = Some(7);

        bt.run_market_maker();

        let execs = drain_executions(&mut bt);
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].msg_type, MsgType::Execute);
        assert_eq!(execs[0].side, Side::Buy);
        assert_eq!(execs[0].price, 10.0);
        assert_eq!(execs[0].quantity, 30);
        assert_eq!(execs[0].order_id, 999);
        assert_eq!(execs[0].bist_time, 7);
        assert!(bt.state.finished_orders.contains(&999));
        // The public book is left untouched.
        assert_eq!(bt.book.sorted_asks(), vec![(10.0, 50)]);
    }

    #[test]
    fn execution_network_time_includes_the_latency() {
        let mut bt = Backtest::builder()
            .agent(Box::new(NoopAgent))
            .reader(OrderReader::from_string("1,1,A,X,S,10.0,0,50,1\n"), "X")
            .latency(2.0)
            .build()
            .unwrap();
        bt.run().unwrap();
        bt.state
            .test_orders
            .insert(1000, resting(Side::Buy, 10.0, 10, 1000));
        bt.last_timestamp = Some(5_000_000_000);

        bt.run_market_maker();

        let execs = drain_executions(&mut bt);
        assert_eq!(execs[0].bist_time, 5_000_000_000);
        assert_eq!(execs[0].network_time, 7_000_000_000);
    }

    #[test]
    fn bid_walks_levels_and_leaves_the_residual() {
        let mut bt = backtest_with_book(
            "1,1,A,X,S,11.0,0,40,1\n\
             1,1,A,X,S,12.0,0,200,2\n",
        );
        bt.state
            .test_orders
            .insert(7, resting(Side::Buy, 12.0, 100, 7));
        bt.last_timestamp = Some(2);

        bt.run_market_maker();

        let execs = drain_executions(&mut bt);
        assert_eq!(
            execs
                .iter()
                .map(|o| (o.price, o.quantity))
                .collect::<Vec<_>>(),
            vec![(11.0, 40), (12.0, 60)]
        );
        assert!(bt.state.finished_orders.contains(&7));
    }

    #[test]
    fn sweep_stops_at_the_first_noncrossing_level() {
        let mut bt = backtest_with_book("1,1,A,X,S,11.0,0,40,1\n");
        // The aggressive bid crosses; the passive one would cross nothing,
        // and the sweep stops before even looking at it.
        bt.state
            .test_orders
            .insert(1, resting(Side::Buy, 11.0, 10, 1));
        bt.state
            .test_orders
            .insert(2, resting(Side::Buy, 5.0, 10, 2));
        bt.last_timestamp = Some(2);

        bt.run_market_maker();

        let execs = drain_executions(&mut bt);
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].order_id, 1);
        assert!(!bt.state.finished_orders.contains(&2));
    }

    #[test]
    fn ask_execution_carries_the_limit_price() {
        // Bids rest at 10.0; the agent's ask is priced at 9.5. The synthetic
        // execution reports the ask's own limit, not the touched level.
        let mut bt = backtest_with_book("1,1,A,X,B,10.0,0,50,1\n");
        bt.state
            .test_orders
            .insert(5, resting(Side::Sell, 9.5, 20, 5));
        bt.last_timestamp = Some(2);

        bt.run_market_maker();

        let execs = drain_executions(&mut bt);
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].side, Side::Sell);
        assert_eq!(execs[0].price, 9.5);
        assert_eq!(execs[0].quantity, 20);
        assert!(bt.state.finished_orders.contains(&5));
        assert_eq!(bt.book.sorted_bids(), vec![(10.0, 50)]);
    }

    #[test]
    fn ask_above_the_best_bid_does_not_trade() {
        let mut bt = backtest_with_book("1,1,A,X,B,10.0,0,50,1\n");
        bt.state
            .test_orders
            .insert(5, resting(Side::Sell, 10.5, 20, 5));
        bt.last_timestamp = Some(2);

        bt.run_market_maker();

        assert!(drain_executions(&mut bt).is_empty());
        assert!(!bt.state.finished_orders.contains(&5));
    }

    #[test]
    fn finished_orders_are_not_swept_again() {
        let mut bt = backtest_with_book("1,1,A,X,S,10.0,0,50,1\n");
        bt.state
            .test_orders
            .insert(999, resting(Side::Buy, 10.0, 30, 999));
        bt.last_timestamp = Some(2);

        bt.run_market_maker();
        assert_eq!(drain_executions(&mut bt).len(), 1);

        // The fill has not been delivered yet, so the order still rests in
        // `test_orders`, but the sweep must not execute it twice.
        bt.run_market_maker();
        assert!(drain_executions(&mut bt).is_empty());
    }

    #[test]
    fn deeper_bid_continues_on_the_residual_level() {
        let mut bt = backtest_with_book("1,1,A,X,S,10.0,0,100,1\n");
        bt.state
            .test_orders
            .insert(1, resting(Side::Buy, 10.0, 30, 1));
        bt.state
            .test_orders
            .insert(2, resting(Side::Buy, 10.0, 30, 2));
        bt.last_timestamp = Some(2);

        bt.run_market_maker();

        let execs = drain_executions(&mut bt);
        assert_eq!(execs.len(), 2);
        assert_eq!(execs[0].quantity, 30);
        assert_eq!(execs[1].quantity, 30);
        assert!(bt.state.finished_orders.contains(&1));
        assert!(bt.state.finished_orders.contains(&2));
    }
}
