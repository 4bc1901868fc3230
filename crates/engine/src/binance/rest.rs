use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use common::{
    Balance, Error, ExchangeClient, Fill, Kline, Order, OrderReport, OrderStatus, Result,
};

pub const LIVE_URL: &str = "https://api.binance.com";
pub const TESTNET_URL: &str = "https://testnet.binance.vision";

/// Binance answers at most this many candles per kline request.
const KLINE_LIMIT: u32 = 1000;

/// REST API client for Binance spot. Used for market data, order placement
/// and account queries.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BinanceClient {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Unauthenticated client, good for market data only.
    pub fn public(base_url: impl Into<String>) -> Result<Self> {
        Self::new("", "", base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    fn sign(&self, query: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{params}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{}", self.base_url, self.signed_query(params));
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(self.signed_query(params))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn klines(&self, pair: &str, interval: &str, start: DateTime<Utc>) -> Result<Vec<Kline>> {
        let params = format!(
            "symbol={pair}&interval={interval}&startTime={}&limit={KLINE_LIMIT}",
            start.timestamp_millis()
        );
        let body = self.public_get("/api/v3/klines", &params).await?;
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)?;
        let klines = rows.iter().map(|row| parse_kline(row)).collect::<Result<Vec<_>>>()?;
        debug!(pair = %pair, count = klines.len(), "Fetched klines");
        Ok(klines)
    }

    async fn market_order(&self, order: &Order) -> Result<OrderReport> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
            order.pair, order.side, order.quantity, order.client_id
        );

        debug!(pair = %order.pair, side = %order.side, qty = order.quantity, "Submitting order to Binance");
        let body = self.signed_post("/api/v3/order", &params).await?;
        let resp: OrderResponse = serde_json::from_str(&body)?;
        resp.into_report()
    }

    async fn order_status(&self, pair: &str, order_id: u64) -> Result<OrderReport> {
        let params = format!("symbol={pair}&orderId={order_id}");
        let body = self.signed_get("/api/v3/order", &params).await?;
        let resp: OrderResponse = serde_json::from_str(&body)?;
        resp.into_report()
    }

    async fn asset_balance(&self, asset: &str) -> Result<Balance> {
        let body = self.signed_get("/api/v3/account", "").await?;
        let account: AccountResponse = serde_json::from_str(&body)?;

        match account.balances.into_iter().find(|b| b.asset == asset) {
            Some(b) => Ok(Balance {
                asset: b.asset,
                free: parse_num("free", &b.free)?,
                locked: parse_num("locked", &b.locked)?,
            }),
            // Binance omits assets the account has never held.
            None => Ok(Balance {
                asset: asset.to_string(),
                free: 0.0,
                locked: 0.0,
            }),
        }
    }
}

async fn read_body(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_failure(status, body))
    }
}

/// Map a non-2xx response to the error variant the trading loop reports on.
fn classify_failure(status: StatusCode, body: String) -> Error {
    let code = serde_json::from_str::<ApiError>(&body).ok().map(|e| e.code);
    let status = status.as_u16();
    match (status, code) {
        // 418 is Binance's IP ban after ignoring 429s
        (429 | 418, _) => Error::RateLimited {
            status,
            message: body,
        },
        (401, _) | (_, Some(-2014 | -2015 | -1022)) => Error::Auth(body),
        _ => Error::Exchange {
            status,
            message: body,
        },
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiError {
    code: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    symbol: String,
    order_id: u64,
    status: String,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

impl OrderResponse {
    fn into_report(self) -> Result<OrderReport> {
        let fills = self
            .fills
            .iter()
            .map(|f| {
                Ok(Fill {
                    price: parse_num("fill price", &f.price)?,
                    qty: parse_num("fill qty", &f.qty)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(OrderReport {
            order_id: self.order_id,
            pair: self.symbol,
            status: OrderStatus::parse(&self.status),
            fills,
            executed_qty: opt_num("executedQty", self.executed_qty.as_deref())?,
            cumulative_quote_qty: opt_num("cummulativeQuoteQty", self.cummulative_quote_qty.as_deref())?,
        })
    }
}

#[derive(Deserialize)]
struct FillDetail {
    price: String,
    qty: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceDetail>,
}

#[derive(Deserialize)]
struct BalanceDetail {
    asset: String,
    free: String,
    locked: String,
}

// ─── Binance kline JSON parsing ──────────────────────────────────────────────

/// A kline row is `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.
fn parse_kline(row: &[serde_json::Value]) -> Result<Kline> {
    if row.len() < 6 {
        return Err(Error::Decode(format!("kline row has {} fields", row.len())));
    }
    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| Error::Decode("kline open time is not an integer".into()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| Error::Decode(format!("kline open time {open_ms} out of range")))?;

    let field = |i: usize, name: &str| -> Result<f64> {
        let raw = row[i]
            .as_str()
            .ok_or_else(|| Error::Decode(format!("kline {name} is not a string")))?;
        parse_num(name, raw)
    };

    Ok(Kline {
        open_time,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

fn parse_num(name: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::Decode(format!("{name} '{raw}': {e}")))
}

fn opt_num(name: &str, raw: Option<&str>) -> Result<f64> {
    raw.map(|r| parse_num(name, r)).unwrap_or(Ok(0.0))
}
