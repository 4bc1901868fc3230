pub mod binance;
pub mod executor;
pub mod lifecycle;

pub use binance::BinanceClient;
pub use executor::{ExecutionOutcome, OrderExecutor};
pub use lifecycle::{TickOutcome, TradingLoop};
