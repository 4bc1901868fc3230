use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use common::{Result, TradeRecord};

use crate::DAY_FORMAT;

pub const TRADE_LOG_HEADER: &str = "sym,side,amount,price";

/// Per-day CSV of completed trades: `<dir>/<YYYY-MM-DD>.csv`.
#[derive(Debug, Clone)]
pub struct TradeLog {
    dir: PathBuf,
}

impl TradeLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, day: &DateTime<Local>) -> PathBuf {
        self.dir.join(format!("{}.csv", day.format(DAY_FORMAT)))
    }

    /// Append one row, writing the header first if the day's file is new.
    /// The row is filed under the local date of the trade's timestamp.
    pub fn append(&self, trade: &TradeRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(&trade.timestamp.with_timezone(&Local));
        let is_new = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if is_new {
            writeln!(file, "{TRADE_LOG_HEADER}")?;
        }
        writeln!(
            file,
            "{},{},{},{}",
            trade.symbol,
            trade.side.label(),
            trade.quantity,
            trade.fill_price
        )?;
        debug!(path = %path.display(), order_id = trade.order_id, "Trade logged");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use common::OrderSide;

    use super::*;

    fn trade(side: OrderSide, price: f64) -> TradeRecord {
        TradeRecord {
            order_id: 7,
            symbol: "BTCUSDT".into(),
            side,
            quantity: 0.001,
            fill_price: price,
            notional: price * 0.001,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn header_written_once_then_one_row_per_trade() {
        let dir = tempfile::tempdir().unwrap();
        let log = TradeLog::new(dir.path().join("trades"));

        let path = log.append(&trade(OrderSide::Buy, 27_000.5)).unwrap();
        log.append(&trade(OrderSide::Sell, 28_000.0)).unwrap();
        log.append(&trade(OrderSide::Buy, 26_500.25)).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], TRADE_LOG_HEADER);
        assert_eq!(lines[1], "BTCUSDT,buy,0.001,27000.5");
        assert_eq!(lines[2], "BTCUSDT,sell,0.001,28000");
        assert_eq!(lines[3], "BTCUSDT,buy,0.001,26500.25");
    }
}
