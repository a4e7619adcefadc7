use std::{
    fs::File,
    io::{BufRead, BufReader, Error},
    path::Path,
};

use tracing::debug;

use crate::types::{MsgType, Order, Side};

/// Reads the historical order stream one line at a time.
///
/// Each line carries nine comma-separated fields:
/// `network_time, bist_time, msg_type, asset_name, side, price, que_loc,
/// quantity, order_id`, with the timestamps given as decimal nanoseconds
/// since the Unix epoch. The queue location is ignored. Lines that do not
/// parse are skipped by the caller without advancing simulated time; end of
/// file closes the reader.
pub struct OrderReader {
    reader: Option<Box<dyn BufRead>>,
}

impl OrderReader {
    /// Opens the order stream at the given path. A missing file is an error
    /// at construction.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(Self {
            reader: Some(Box::new(BufReader::new(file))),
        })
    }

    /// Constructs a reader over an in-memory stream.
    pub fn from_string(data: &str) -> Self {
        Self {
            reader: Some(Box::new(std::io::Cursor::new(data.to_string()))),
        }
    }

    /// Returns `true` until the end of the stream has been reached.
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Reads the next line and parses it into an [`Order`].
    ///
    /// Returns `None` when the stream is closed, at end of file (which closes
    /// the stream), or for an unparseable line (the stream stays open).
    pub fn next_order(&mut self) -> Option<Order> {
        let reader = self.reader.as_mut()?;

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => {
                self.reader = None;
                return None;
            }
            Ok(_) => {}
        }

        let order = parse_order(&line);
        if order.is_none() {
            debug!(line = line.trim(), "skipping unparseable order line");
        }
        order
    }
}

/// Parses one CSV line into an [`Order`], rejecting unknown message types and
/// sides as well as negative prices and quantities.
pub fn parse_order(line: &str) -> Option<Order> {
    let mut fields = line.trim().split(',');
    let network_time = fields.next()?.parse::<i64>().ok()?;
    let bist_time = fields.next()?.parse::<i64>().ok()?;
    let msg_type = parse_msg_type(fields.next()?)?;
    let asset = fields.next()?.to_string();
    let side = parse_side(fields.next()?)?;
    let price = fields.next()?.parse::<f64>().ok()?;
    let _que_loc = fields.next()?;
    let quantity = fields.next()?.parse::<i64>().ok()?;
    let order_id = fields.next()?.parse::<u64>().ok()?;
    if fields.next().is_some() || price < 0.0 || quantity < 0 {
        return None;
    }

    Some(Order {
        network_time,
        bist_time,
        msg_type,
        asset,
        side,
        price,
        quantity,
        order_id,
    })
}

fn parse_msg_type(s: &str) -> Option<MsgType> {
    match s {
        "A" => Some(MsgType::Add),
        "D" => Some(MsgType::Delete),
        "E" => Some(MsgType::Execute),
        "C" => Some(MsgType::CancelReq),
        _ => None,
    }
}

fn parse_side(s: &str) -> Option<Side> {
    match s {
        "B" => Some(Side::Buy),
        "S" => Some(Side::Sell),
        _ => None,
    }
}
