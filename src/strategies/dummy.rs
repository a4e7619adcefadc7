use crate::{
    depth::LobSnapshot,
    types::{Agent, Balance, Order},
};

/// An agent that never trades. Useful for replaying the book alone, e.g. to
/// export its snapshots.
pub struct DummyAgent;

impl Agent for DummyAgent {
    fn strategy(&mut self, _book: &LobSnapshot, _balance: &Balance, _latency: i64) -> Vec<Order> {
        Vec::new()
    }
}
