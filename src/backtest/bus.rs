use std::collections::VecDeque;

use crate::types::Order;

/// Provides a FIFO bus for transporting order messages between the network
/// edge and the exchange.
///
/// Entries keep their insertion order; across buses the scheduler interleaves
/// by the `network_time` of the front entry.
#[derive(Debug, Default)]
pub struct OrderBus {
    queue: VecDeque<Order>,
}

impl OrderBus {
    /// Constructs an empty `OrderBus`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the `network_time` of the earliest message in the bus.
    pub fn earliest_timestamp(&self) -> Option<i64> {
        self.queue.front().map(|order| order.network_time)
    }

    /// Appends a message to the back of the bus.
    pub fn append(&mut self, order: Order) {
        self.queue.push_back(order);
    }

    /// Removes and returns the earliest message, or `None` if the bus is
    /// empty.
    pub fn pop_front(&mut self) -> Option<Order> {
        self.queue.pop_front()
    }

    /// Returns the number of messages in the bus.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if the bus holds no messages.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MsgType, Side};

    fn order(network_time: i64, order_id: u64) -> Order {
        Order {
            network_time,
            bist_time: network_time,
            msg_type: MsgType::Add,
            asset: "X".to_string(),
            side: Side::Buy,
            price: 1.0,
            quantity: 1,
            order_id,
        }
    }

    #[test]
    fn keeps_fifo_order_and_reports_front_timestamp() {
        let mut bus = OrderBus::new();
        assert_eq!(bus.earliest_timestamp(), None);

        bus.append(order(5, 1));
        bus.append(order(3, 2));
        assert_eq!(bus.earliest_timestamp(), Some(5));
        assert_eq!(bus.len(), 2);

        assert_eq!(bus.pop_front().unwrap().order_id, 1);
        assert_eq!(bus.earliest_timestamp(), Some(3));
        assert_eq!(bus.pop_front().unwrap().order_id, 2);
        assert!(bus.is_empty());
    }
}
