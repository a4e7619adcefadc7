use tracing::debug;
use uuid::Uuid;

use crate::{
    depth::LobSnapshot,
    types::{Agent, Balance, MsgType, Order, Side},
};

/// Where the agent prices its orders relative to the touch.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum Pricing {
    /// Cross the spread: buy at the best ask, sell at the best bid.
    #[default]
    Aggressive,
    /// Join the own side: buy at the best bid, sell at the best ask.
    Conservative,
    /// Price at the mid.
    Mid,
}

/// An agent trading on an exponentially weighted moving average of the mid
/// price: it bids when the EWMA sits above the current mid (the price has
/// fallen below trend) and asks when it sits below. It never cancels.
pub struct BasicEwmaAgent {
    beta: f64,
    margin: f64,
    /// Minimum spacing between orders, in nanoseconds.
    wait_time: i64,
    pricing: Pricing,
    fixed_quantity: Option<i64>,
    proportional_quantity: Option<f64>,
    ewma_price: Option<f64>,
    last_order_time: Option<i64>,
}

impl Default for BasicEwmaAgent {
    fn default() -> Self {
        Self {
            beta: 0.9,
            margin: 0.0,
            wait_time: 0,
            pricing: Pricing::default(),
            fixed_quantity: None,
            proportional_quantity: None,
            ewma_price: None,
            last_order_time: None,
        }
    }
}

impl BasicEwmaAgent {
    /// Constructs a `BasicEwmaAgent` from `key=value` options.
    ///
    /// Recognized keys: `beta`, `margin`, `wait_time` (seconds), `pricing`
    /// (`aggressive`, `conservative` or `mid`), `fixed_quantity`,
    /// `proportional_quantity`. Anything else, and any value that does not
    /// coerce, is ignored. Without a quantity option the agent mirrors the
    /// full touched quantity (`proportional_quantity = 1`).
    pub fn from_options(options: &[String]) -> Self {
        let mut agent = Self::default();
        for option in options {
            let Some((key, value)) = option.split_once('=') else {
                continue;
            };
            match key {
                "beta" => {
                    if let Ok(beta) = value.parse() {
                        agent.beta = beta;
                    }
                }
                "margin" => {
                    if let Ok(margin) = value.parse() {
                        agent.margin = margin;
                    }
                }
                "wait_time" => {
                    if let Ok(seconds) = value.parse::<f64>() {
                        agent.wait_time = (seconds * 1e9).round() as i64;
                    }
                }
                "pricing" => match value {
                    "aggressive" => agent.pricing = Pricing::Aggressive,
                    "conservative" => agent.pricing = Pricing::Conservative,
                    "mid" => agent.pricing = Pricing::Mid,
                    _ => {}
                },
                "fixed_quantity" => {
                    if let Ok(quantity) = value.parse() {
                        agent.fixed_quantity = Some(quantity);
                    }
                }
                "proportional_quantity" => {
                    if let Ok(proportion) = value.parse() {
                        agent.proportional_quantity = Some(proportion);
                    }
                }
                _ => debug!(key, "ignoring unknown strategy option"),
            }
        }
        if agent.fixed_quantity.is_none() && agent.proportional_quantity.is_none() {
            agent.proportional_quantity = Some(1.0);
        }
        agent
    }

    fn quantity(&self, touched_qty: i64) -> i64 {
        match self.fixed_quantity {
            Some(quantity) => quantity,
            None => (touched_qty as f64 * self.proportional_quantity.unwrap_or(1.0)) as i64,
        }
    }

    fn order(book: &LobSnapshot, latency: i64, side: Side, price: f64, quantity: i64) -> Order {
        Order {
            network_time: book.timestamp,
            bist_time: book.timestamp + latency,
            msg_type: MsgType::Add,
            asset: book.asset.clone(),
            side,
            price,
            quantity,
            order_id: Uuid::new_v4().as_u64_pair().0,
        }
    }
}

impl Agent for BasicEwmaAgent {
    fn strategy(&mut self, book: &LobSnapshot, balance: &Balance, latency: i64) -> Vec<Order> {
        let (Some((bid_price, bid_qty)), Some((ask_price, ask_qty))) =
            (book.best_bid(), book.best_ask())
        else {
            return Vec::new();
        };

        if let Some(last) = self.last_order_time {
            if last + self.wait_time > book.timestamp {
                return Vec::new();
            }
        }
        self.last_order_time = Some(book.timestamp);

        let mid_price = (bid_price + ask_price) / 2.0;
        let ewma_price = match self.ewma_price {
            None => mid_price,
            Some(prev) => self.beta * prev + (1.0 - self.beta) * mid_price,
        };
        self.ewma_price = Some(ewma_price);

        if ewma_price > mid_price * (1.0 + self.margin) {
            // The mid dropped below trend: buy.
            let price = match self.pricing {
                Pricing::Aggressive => ask_price,
                Pricing::Conservative => bid_price,
                Pricing::Mid => mid_price,
            };
            if balance.money < price {
                return Vec::new();
            }
            let quantity = self
                .quantity(ask_qty)
                .min((balance.money / price).floor() as i64);
            vec![Self::order(book, latency, Side::Buy, price, quantity)]
        } else if ewma_price < mid_price * (1.0 - self.margin) {
            // The mid rose above trend: sell what we hold.
            if balance.stock == 0 {
                return Vec::new();
            }
            let price = match self.pricing {
                Pricing::Aggressive => bid_price,
                Pricing::Conservative => ask_price,
                Pricing::Mid => mid_price,
            };
            let quantity = self.quantity(bid_qty).min(balance.stock);
            vec![Self::order(book, latency, Side::Sell, price, quantity)]
        } else {
            Vec::new()
        }
    }
}
