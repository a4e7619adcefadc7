pub use crate::{
    backtest::{
        Backtest,
        BacktestBuilder,
        BacktestError,
        BasePrice,
        HistoryRecorder,
        OrderBus,
        State,
        total_balance,
    },
    data::OrderReader,
    depth::{LimitOrderBook, LobSnapshot, format_timestamp, write_snapshots_csv},
    strategies::{BasicEwmaAgent, DummyAgent, build_agent},
    types::{Agent, Balance, BuildError, MsgType, Order, OrderId, PriceTable, Side},
};
