use std::{
    fs::File,
    io::{BufWriter, Error, Write},
    path::Path,
};

use chrono::DateTime;
use serde::Serialize;

use crate::types::display_price;

/// A snapshot of the limit order book at one network instant.
///
/// `bids` and `asks` are ordered worst-first (the last element is the best
/// level), and `mold_package` concatenates the wire forms of every message
/// processed since the previous snapshot, joined by `;`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LobSnapshot {
    pub timestamp: i64,
    pub asset: String,
    pub bids: Vec<(f64, i64)>,
    pub asks: Vec<(f64, i64)>,
    pub mold_package: String,
}

impl LobSnapshot {
    /// Returns the best bid level, if any.
    pub fn best_bid(&self) -> Option<(f64, i64)> {
        self.bids.last().copied()
    }

    /// Returns the best ask level, if any.
    pub fn best_ask(&self) -> Option<(f64, i64)> {
        self.asks.last().copied()
    }

    fn csv_row(&self) -> String {
        let mut row = format!("{},{}", format_timestamp(self.timestamp), self.asset);

        // Levels count from the best: bid1/ask1 sit at the tail of the
        // worst-first vectors. Missing levels are written as zeros.
        for i in (1..=3).rev() {
            let (px, qty) = level(&self.bids, i);
            row.push_str(&format!(",{},{}", qty, display_price(px)));
        }
        for i in 1..=3 {
            let (px, qty) = level(&self.asks, i);
            row.push_str(&format!(",{},{}", display_price(px), qty));
        }

        row.push(',');
        row.push_str(&self.mold_package);
        row
    }
}

fn level(levels: &[(f64, i64)], i: usize) -> (f64, i64) {
    if i <= levels.len() {
        levels[levels.len() - i]
    } else {
        (0.0, 0)
    }
}

/// Renders a nanosecond Unix timestamp as ISO 8601, omitting the fractional
/// part when it is zero.
pub fn format_timestamp(ts: i64) -> String {
    let datetime = DateTime::from_timestamp(ts.div_euclid(1_000_000_000), ts.rem_euclid(1_000_000_000) as u32)
        .expect("timestamp out of range");
    datetime.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Writes the snapshots as a row-per-snapshot CSV file.
pub fn write_snapshots_csv<P: AsRef<Path>>(snapshots: &[LobSnapshot], path: P) -> Result<(), Error> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(
        file,
        "timestamp,asset,bid3qty,bid3px,bid2qty,bid2px,bid1qty,bid1px,\
         ask1px,ask1qty,ask2px,ask2qty,ask3px,ask3qty,mold_package"
    )?;
    for snapshot in snapshots {
        writeln!(file, "{}", snapshot.csv_row())?;
    }
    Ok(())
}
