pub mod account;
pub mod activity;
pub mod trades;

pub use account::AccountStore;
pub use activity::ActivityLog;
pub use trades::{TradeLog, TRADE_LOG_HEADER};

/// File name stem for per-day log files.
pub(crate) const DAY_FORMAT: &str = "%Y-%m-%d";
