use std::{fs, path::PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::{
    depth::format_timestamp,
    types::{Balance, PriceTable},
};

/// Price used when valuing the agent's stock.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum BasePrice {
    /// The mid price of the book.
    Mid,
    /// The last traded price; the ask side when optimistic, the bid side
    /// otherwise.
    Last,
    /// The best quoted price; the ask side when optimistic, the bid side
    /// otherwise.
    Best,
}

/// Values the whole balance sheet against the given price table:
/// `money + held_money + (stock + held_stock) * price`.
///
/// Returns `None` while the chosen reference price is not yet available.
pub fn total_balance(
    balance: &Balance,
    prices: &PriceTable,
    base_price: BasePrice,
    optimistic: bool,
) -> Option<f64> {
    let price = match (base_price, optimistic) {
        (BasePrice::Mid, _) => prices.mid,
        (BasePrice::Last, true) => prices.last_ask,
        (BasePrice::Last, false) => prices.last_bid,
        (BasePrice::Best, true) => prices.best_ask,
        (BasePrice::Best, false) => prices.best_bid,
    }?;

    let total_stock = (balance.stock + balance.held_stock) as f64;
    Some(balance.money + balance.held_money + total_stock * price)
}

/// Records one balance and price-table sample per simulated exchange instant.
///
/// Samples are value copies appended to parallel arrays, so later mutation of
/// the live structures never leaks into the history. The timestamp is absent
/// only for the terminal sample of an empty input.
#[derive(Debug, Default)]
pub struct HistoryRecorder {
    pub timestamps: Vec<Option<i64>>,
    pub balances: Vec<Balance>,
    pub prices: Vec<PriceTable>,
}

/// The persisted outcome of a backtest run.
#[derive(Serialize)]
struct BacktestReport<'a> {
    balance: &'a Balance,
    timestamps: Vec<Option<String>>,
    price_history: &'a [PriceTable],
    balance_history: &'a [Balance],
}

impl HistoryRecorder {
    /// Constructs an empty `HistoryRecorder`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends one sample.
    pub fn record(&mut self, timestamp: Option<i64>, balance: &Balance, prices: &PriceTable) {
        self.timestamps.push(timestamp);
        self.balances.push(*balance);
        self.prices.push(*prices);
    }

    /// Returns the number of recorded samples.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns `true` if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Values the first recorded sample.
    pub fn initial_total_balance(&self, base_price: BasePrice, optimistic: bool) -> Option<f64> {
        total_balance(
            self.balances.first()?,
            self.prices.first()?,
            base_price,
            optimistic,
        )
    }

    /// Values every recorded sample.
    pub fn total_balance_history(
        &self,
        base_price: BasePrice,
        optimistic: bool,
    ) -> Vec<Option<f64>> {
        self.balances
            .iter()
            .zip(self.prices.iter())
            .map(|(balance, prices)| total_balance(balance, prices, base_price, optimistic))
            .collect()
    }

    /// Persists the run outcome as a timestamped JSON report under `dir`,
    /// returning the path written.
    pub fn save_report(
        &self,
        balance: &Balance,
        dir: &PathBuf,
        strategy: &str,
    ) -> Result<PathBuf, anyhow::Error> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "{strategy}-{}.json",
            Local::now().format("%Y%m%d_%H%M%S")
        ));

        let report = BacktestReport {
            balance,
            timestamps: self
                .timestamps
                .iter()
                .map(|ts| ts.map(format_timestamp))
                .collect(),
            price_history: &self.prices,
            balance_history: &self.balances,
        };
        fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), samples = self.len(), "saved backtest report");
        Ok(path)
    }
}
