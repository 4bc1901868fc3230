use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One candlestick as returned by the exchange's kline endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Closing price; the only field the indicator consumes.
    pub close: f64,
    pub volume: f64,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Lowercase label used in the trade log and activity lines.
    pub fn label(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A market order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Client-side order id, sent as `newClientOrderId`.
    pub client_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub quantity: f64,
}

impl Order {
    pub fn market(pair: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().simple().to_string(),
            pair: pair.into(),
            side,
            quantity,
        }
    }
}

/// Order lifecycle states reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Other(String),
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "NEW" | "PENDING_NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    /// True once the order can no longer fill any further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Expired => write!(f, "EXPIRED"),
            OrderStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A single (possibly partial) execution of an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub qty: f64,
}

/// The exchange's view of an order at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub order_id: u64,
    pub pair: String,
    pub status: OrderStatus,
    /// Individual executions. Binance only returns these on order placement,
    /// so status lookups usually leave this empty.
    pub fills: Vec<Fill>,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
}

impl OrderReport {
    /// Total quote spent or received: Σ price × qty.
    pub fn notional(&self) -> f64 {
        if self.fills.is_empty() {
            self.cumulative_quote_qty
        } else {
            self.fills.iter().map(|f| f.price * f.qty).sum()
        }
    }

    /// Volume-weighted average fill price, `None` if nothing executed.
    pub fn average_price(&self) -> Option<f64> {
        let qty: f64 = if self.fills.is_empty() {
            self.executed_qty
        } else {
            self.fills.iter().map(|f| f.qty).sum()
        };
        if qty > 0.0 {
            Some(self.notional() / qty)
        } else {
            None
        }
    }
}

/// Free and locked holdings of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

/// A completed trade, as written to the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Volume-weighted average fill price.
    pub fill_price: f64,
    /// Σ price × qty across fills.
    pub notional: f64,
    pub timestamp: DateTime<Utc>,
}

/// Trade direction requested by the signal evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
}

impl Signal {
    pub fn side(&self) -> OrderSide {
        match self {
            Signal::Buy => OrderSide::Buy,
            Signal::Sell => OrderSide::Sell,
        }
    }
}

/// Persisted bot state: which leg of the round trip we are waiting for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// `true` while waiting for a buy entry, `false` while holding and
    /// waiting for a sell exit.
    pub is_buying: bool,
    /// Reserved. Never populated by the trading loop.
    #[serde(default)]
    pub assets: BTreeMap<String, f64>,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            is_buying: true,
            assets: BTreeMap::new(),
        }
    }
}

impl Account {
    /// Flip to the other leg after a confirmed fill.
    pub fn toggle(&mut self) {
        self.is_buying = !self.is_buying;
    }

    /// The side this account is currently waiting to trade.
    pub fn pending_side(&self) -> OrderSide {
        if self.is_buying {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(fills: Vec<Fill>) -> OrderReport {
        OrderReport {
            order_id: 1,
            pair: "BTCUSDT".into(),
            status: OrderStatus::Filled,
            fills,
            executed_qty: 0.0,
            cumulative_quote_qty: 0.0,
        }
    }

    #[test]
    fn average_price_is_volume_weighted() {
        let r = report(vec![
            Fill { price: 100.0, qty: 1.0 },
            Fill { price: 110.0, qty: 3.0 },
        ]);
        assert!((r.notional() - 430.0).abs() < 1e-9);
        assert!((r.average_price().unwrap() - 107.5).abs() < 1e-9);
    }

    #[test]
    fn average_price_falls_back_to_cumulative_quote() {
        let mut r = report(Vec::new());
        r.executed_qty = 0.5;
        r.cumulative_quote_qty = 15_000.0;
        assert!((r.average_price().unwrap() - 30_000.0).abs() < 1e-9);
    }

    #[test]
    fn average_price_none_without_execution() {
        assert!(report(Vec::new()).average_price().is_none());
    }

    #[test]
    fn order_status_parsing() {
        assert_eq!(OrderStatus::parse("FILLED"), OrderStatus::Filled);
        assert_eq!(OrderStatus::parse("EXPIRED_IN_MATCH"), OrderStatus::Expired);
        assert!(!OrderStatus::parse("PARTIALLY_FILLED").is_terminal());
        assert!(OrderStatus::parse("REJECTED").is_terminal());
        assert_eq!(OrderStatus::parse("WEIRD"), OrderStatus::Other("WEIRD".into()));
    }

    #[test]
    fn account_defaults_to_buying_and_toggles() {
        let mut account = Account::default();
        assert!(account.is_buying);
        assert_eq!(account.pending_side(), OrderSide::Buy);
        account.toggle();
        assert!(!account.is_buying);
        assert_eq!(account.pending_side(), OrderSide::Sell);
    }
}
