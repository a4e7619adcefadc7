pub use book::LimitOrderBook;
pub use snapshot::{LobSnapshot, format_timestamp, write_snapshots_csv};

mod book;
mod snapshot;
