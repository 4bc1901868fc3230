use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Balance, Kline, Order, OrderReport, Result};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Only `OrderExecutor` in `crates/engine` submits orders through it; the
/// trading loop uses it for market data.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Candlesticks for `pair` at `interval` (e.g. "1m") opened at or after
    /// `start`, oldest first.
    async fn klines(&self, pair: &str, interval: &str, start: DateTime<Utc>) -> Result<Vec<Kline>>;

    /// Submit a market order. The returned report may already be FILLED.
    async fn market_order(&self, order: &Order) -> Result<OrderReport>;

    /// Look up an order previously placed with `market_order`.
    async fn order_status(&self, pair: &str, order_id: u64) -> Result<OrderReport>;

    /// Holdings of a single asset.
    async fn asset_balance(&self, asset: &str) -> Result<Balance>;
}
