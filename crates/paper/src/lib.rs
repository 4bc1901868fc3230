use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Balance, Error, ExchangeClient, Fill, Kline, Order, OrderReport, OrderSide, OrderStatus,
    Result,
};

const QUOTE_ASSETS: [&str; 5] = ["USDT", "USDC", "BUSD", "BTC", "ETH"];

/// Simulated exchange client for paper trading.
///
/// Fills are simulated at the latest known close with configurable slippage.
/// Market data comes either from a real exchange client (`with_market_data`)
/// or from candles pushed with `feed_klines`. No real orders are ever sent.
pub struct PaperClient {
    market: Option<Arc<dyn ExchangeClient>>,
    /// Candles per pair pushed by `feed_klines`.
    candles: RwLock<HashMap<String, Vec<Kline>>>,
    /// Latest close seen per pair, from either source.
    prices: RwLock<HashMap<String, f64>>,
    /// Simulated holdings per asset.
    balances: RwLock<HashMap<String, f64>>,
    orders: RwLock<HashMap<u64, PaperOrder>>,
    next_order_id: AtomicU64,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    /// Status polls an order stays NEW before filling. 0 fills on placement.
    fill_after_polls: u32,
    /// Number of equal partial fills each order is split into.
    fill_parts: usize,
}

struct PaperOrder {
    pair: String,
    side: OrderSide,
    quantity: f64,
    price: f64,
    polls_left: u32,
}

impl PaperClient {
    pub fn new(initial_quote_balance: f64, slippage_bps: f64) -> Self {
        info!(
            balance = initial_quote_balance,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        let balances = HashMap::from([("USDT".to_string(), initial_quote_balance)]);
        Self {
            market: None,
            candles: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            balances: RwLock::new(balances),
            orders: RwLock::new(HashMap::new()),
            next_order_id: AtomicU64::new(1),
            slippage_bps,
            fill_after_polls: 0,
            fill_parts: 1,
        }
    }

    /// Source candles from a real exchange instead of `feed_klines`.
    pub fn with_market_data(mut self, market: Arc<dyn ExchangeClient>) -> Self {
        self.market = Some(market);
        self
    }

    /// Keep orders NEW for `polls` status lookups before they fill.
    pub fn with_fill_delay(mut self, polls: u32) -> Self {
        self.fill_after_polls = polls;
        self
    }

    /// Split every fill into `parts` equal executions.
    pub fn with_partial_fills(mut self, parts: usize) -> Self {
        self.fill_parts = parts.max(1);
        self
    }

    /// Replace the candle series served for `pair`.
    pub async fn feed_klines(&self, pair: &str, klines: Vec<Kline>) {
        if let Some(last) = klines.last() {
            self.prices.write().await.insert(pair.to_string(), last.close);
        }
        self.candles.write().await.insert(pair.to_string(), klines);
    }

    /// Convenience for tests: one-minute candles ending now with the given closes.
    pub async fn feed_closes(&self, pair: &str, closes: &[f64]) {
        self.feed_klines(pair, klines_from_closes(closes, Utc::now())).await;
    }

    fn fill_price(&self, side: OrderSide, mid: f64) -> f64 {
        // Buys pay more, sells receive less
        match side {
            OrderSide::Buy => mid * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    async fn settle(&self, order: &PaperOrder) {
        let (base, quote) = split_pair(&order.pair);
        let notional = order.price * order.quantity;
        let mut balances = self.balances.write().await;
        let (base_delta, quote_delta) = match order.side {
            OrderSide::Buy => (order.quantity, -notional),
            OrderSide::Sell => (-order.quantity, notional),
        };
        *balances.entry(base.to_string()).or_default() += base_delta;
        *balances.entry(quote.to_string()).or_default() += quote_delta;
    }

    fn report(&self, id: u64, order: &PaperOrder, with_fills: bool) -> OrderReport {
        if order.polls_left > 0 {
            return OrderReport {
                order_id: id,
                pair: order.pair.clone(),
                status: OrderStatus::New,
                fills: Vec::new(),
                executed_qty: 0.0,
                cumulative_quote_qty: 0.0,
            };
        }
        let part = order.quantity / self.fill_parts as f64;
        let fills = if with_fills {
            (0..self.fill_parts)
                .map(|_| Fill { price: order.price, qty: part })
                .collect()
        } else {
            Vec::new()
        };
        OrderReport {
            order_id: id,
            pair: order.pair.clone(),
            status: OrderStatus::Filled,
            fills,
            executed_qty: order.quantity,
            cumulative_quote_qty: order.price * order.quantity,
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn klines(&self, pair: &str, interval: &str, start: DateTime<Utc>) -> Result<Vec<Kline>> {
        if let Some(market) = &self.market {
            let klines = market.klines(pair, interval, start).await?;
            if let Some(last) = klines.last() {
                self.prices.write().await.insert(pair.to_string(), last.close);
            }
            return Ok(klines);
        }
        Ok(self.candles.read().await.get(pair).cloned().unwrap_or_default())
    }

    async fn market_order(&self, order: &Order) -> Result<OrderReport> {
        let mid_price = self.prices.read().await.get(&order.pair).copied().ok_or_else(|| {
            Error::Exchange {
                status: 400,
                message: format!(
                    "PaperClient has no price for pair '{}'. Fetch klines first.",
                    order.pair
                ),
            }
        })?;

        let price = self.fill_price(order.side, mid_price);
        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        let paper = PaperOrder {
            pair: order.pair.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            polls_left: self.fill_after_polls,
        };

        debug!(
            pair = %order.pair,
            side = %order.side,
            mid = mid_price,
            fill = price,
            qty = order.quantity,
            "Paper order accepted"
        );

        if paper.polls_left == 0 {
            self.settle(&paper).await;
        }
        let report = self.report(id, &paper, true);
        self.orders.write().await.insert(id, paper);
        Ok(report)
    }

    async fn order_status(&self, pair: &str, order_id: u64) -> Result<OrderReport> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .filter(|o| o.pair == pair)
            .ok_or_else(|| Error::Exchange {
                status: 400,
                message: format!("Order {order_id} does not exist on {pair}"),
            })?;

        if order.polls_left > 0 {
            order.polls_left -= 1;
            if order.polls_left == 0 {
                self.settle(order).await;
            }
        }
        // Status lookups carry no fill list, like Binance's GET /api/v3/order.
        Ok(self.report(order_id, order, false))
    }

    async fn asset_balance(&self, asset: &str) -> Result<Balance> {
        let free = self.balances.read().await.get(asset).copied().unwrap_or(0.0);
        Ok(Balance {
            asset: asset.to_string(),
            free,
            locked: 0.0,
        })
    }
}

/// One-minute candles ending at `end`, flat OHLC at each close.
pub fn klines_from_closes(closes: &[f64], end: DateTime<Utc>) -> Vec<Kline> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Kline {
            open_time: end - Duration::minutes(n - i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

fn split_pair(pair: &str) -> (&str, &str) {
    QUOTE_ASSETS
        .iter()
        .find_map(|q| {
            pair.strip_suffix(q)
                .filter(|base| !base.is_empty())
                .map(|base| (base, *q))
        })
        .unwrap_or((pair, "USDT"))
}
