use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use common::{
    Account, Error, ExchangeClient, Order, OrderSide, OrderStatus, Result, TradeRecord,
};
use store::{AccountStore, ActivityLog, TradeLog};

/// How a submitted market order ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Fully filled. The trade is logged and the account flipped and saved.
    Filled(TradeRecord),
    /// Still not FILLED when the timeout ran out. Account untouched.
    TimedOut {
        order_id: u64,
        last_status: OrderStatus,
    },
    /// The exchange closed the order without filling it. Account untouched.
    Terminated { order_id: u64, status: OrderStatus },
}

/// Submits market orders and waits, bounded, for them to fill.
///
/// This is the ONLY component that places orders through `ExchangeClient` and
/// the only one that flips `Account::is_buying`.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    accounts: AccountStore,
    trades: TradeLog,
    activity: ActivityLog,
    poll_interval: Duration,
    fill_timeout: Duration,
}

impl OrderExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        accounts: AccountStore,
        trades: TradeLog,
        activity: ActivityLog,
    ) -> Self {
        Self {
            client,
            accounts,
            trades,
            activity,
            poll_interval: Duration::from_secs(1),
            fill_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, fill_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.fill_timeout = fill_timeout;
        self
    }

    /// Place a market order for `quantity` of `pair` and wait for it to fill.
    ///
    /// On `Filled`, the trade row is written first, then `account` is toggled
    /// and persisted. If either write fails the error propagates and `account`
    /// is left as it was. The activity line is best-effort.
    pub async fn execute(
        &self,
        account: &mut Account,
        side: OrderSide,
        pair: &str,
        quantity: f64,
    ) -> Result<ExecutionOutcome> {
        let order = Order::market(pair, side, quantity);
        info!(pair = %order.pair, side = %side, qty = quantity, "Executing order");

        let deadline = Instant::now() + self.fill_timeout;
        let mut report = self.client.market_order(&order).await?;
        let order_id = report.order_id;

        while report.status != OrderStatus::Filled {
            if report.status.is_terminal() {
                warn!(order_id, status = %report.status, "Order closed without filling");
                return Ok(ExecutionOutcome::Terminated {
                    order_id,
                    status: report.status,
                });
            }
            if Instant::now() >= deadline {
                warn!(order_id, status = %report.status, timeout = ?self.fill_timeout, "Order not filled in time");
                return Ok(ExecutionOutcome::TimedOut {
                    order_id,
                    last_status: report.status,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            report = self.client.order_status(pair, order_id).await?;
        }

        let fill_price = report.average_price().ok_or_else(|| {
            Error::Decode(format!("order {order_id} reported FILLED with no executed quantity"))
        })?;

        let trade = TradeRecord {
            order_id,
            symbol: pair.to_string(),
            side,
            quantity,
            fill_price,
            notional: report.notional(),
            timestamp: Utc::now(),
        };

        self.trades.append(&trade)?;

        let mut updated = account.clone();
        updated.toggle();
        self.accounts.save(&updated)?;
        *account = updated;

        let line = format!(
            "{} {} {} for {} (notional {})",
            side.label(),
            quantity,
            pair,
            fill_price,
            trade.notional
        );
        if let Err(e) = self.activity.record(&line) {
            warn!(order_id, error = %e, "Failed to write activity log");
        }
        info!(
            pair = %pair,
            side = %side,
            price = fill_price,
            qty = quantity,
            is_buying = account.is_buying,
            "Order filled"
        );

        Ok(ExecutionOutcome::Filled(trade))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;
    use common::{Balance, Kline, OrderReport};
    use paper::PaperClient;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        accounts: AccountStore,
        trades: TradeLog,
        activity: ActivityLog,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            accounts: AccountStore::new(dir.path().join("account.json")),
            trades: TradeLog::new(dir.path().join("trades")),
            activity: ActivityLog::new(dir.path().join("activity")),
            _dir: dir,
        }
    }

    fn executor(client: Arc<dyn ExchangeClient>, fx: &Fixture) -> OrderExecutor {
        OrderExecutor::new(client, fx.accounts.clone(), fx.trades.clone(), fx.activity.clone())
            .with_polling(Duration::from_millis(1), Duration::from_millis(200))
    }

    /// Exchange whose orders stay in a fixed status forever, or fail outright.
    struct StuckExchange {
        status: Option<OrderStatus>,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeClient for StuckExchange {
        async fn klines(&self, _: &str, _: &str, _: DateTime<Utc>) -> Result<Vec<Kline>> {
            Ok(Vec::new())
        }

        async fn market_order(&self, order: &Order) -> Result<OrderReport> {
            match &self.status {
                Some(status) => Ok(OrderReport {
                    order_id: 9,
                    pair: order.pair.clone(),
                    status: status.clone(),
                    fills: Vec::new(),
                    executed_qty: 0.0,
                    cumulative_quote_qty: 0.0,
                }),
                None => Err(Error::Http("connection reset".into())),
            }
        }

        async fn order_status(&self, pair: &str, order_id: u64) -> Result<OrderReport> {
            self.polls.fetch_add(1, Ordering::Relaxed);
            Ok(OrderReport {
                order_id,
                pair: pair.to_string(),
                status: self.status.clone().unwrap_or(OrderStatus::New),
                fills: Vec::new(),
                executed_qty: 0.0,
                cumulative_quote_qty: 0.0,
            })
        }

        async fn asset_balance(&self, asset: &str) -> Result<Balance> {
            Ok(Balance { asset: asset.into(), free: 0.0, locked: 0.0 })
        }
    }

    #[tokio::test]
    async fn filled_buy_flips_account_and_logs_trade() {
        let fx = fixture();
        let client = Arc::new(PaperClient::new(10_000.0, 0.0).with_partial_fills(3));
        client.feed_closes("BTCUSDT", &[27_000.0]).await;
        let exec = executor(client, &fx);

        let mut account = fx.accounts.load().unwrap();
        let outcome = exec.execute(&mut account, OrderSide::Buy, "BTCUSDT", 0.003).await.unwrap();

        let ExecutionOutcome::Filled(trade) = outcome else {
            panic!("expected a fill");
        };
        assert!((trade.fill_price - 27_000.0).abs() < 1e-6);
        assert!((trade.notional - 81.0).abs() < 1e-6);
        assert!(!account.is_buying);
        assert!(!fx.accounts.load().unwrap().is_buying);

        let csv = std::fs::read_dir(fx.trades.dir()).unwrap().next().unwrap().unwrap().path();
        let content = std::fs::read_to_string(csv).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().nth(1).unwrap().starts_with("BTCUSDT,buy,0.003,"));
    }

    #[tokio::test]
    async fn delayed_fill_is_awaited() {
        let fx = fixture();
        let client = Arc::new(PaperClient::new(10_000.0, 0.0).with_fill_delay(3));
        client.feed_closes("BTCUSDT", &[100.0]).await;
        let exec = executor(client, &fx);

        let mut account = Account { is_buying: false, ..Account::default() };
        let outcome = exec.execute(&mut account, OrderSide::Sell, "BTCUSDT", 1.0).await.unwrap();

        assert!(matches!(outcome, ExecutionOutcome::Filled(_)));
        assert!(account.is_buying);
    }

    #[tokio::test]
    async fn timeout_leaves_account_untouched() {
        let fx = fixture();
        let client = Arc::new(StuckExchange {
            status: Some(OrderStatus::PartiallyFilled),
            polls: AtomicUsize::new(0),
        });
        let exec = executor(client.clone(), &fx);

        let mut account = fx.accounts.load().unwrap();
        let outcome = exec.execute(&mut account, OrderSide::Buy, "BTCUSDT", 0.001).await.unwrap();

        assert!(matches!(
            outcome,
            ExecutionOutcome::TimedOut { order_id: 9, last_status: OrderStatus::PartiallyFilled }
        ));
        assert!(client.polls.load(Ordering::Relaxed) > 0);
        assert!(account.is_buying);
        assert!(fx.accounts.load().unwrap().is_buying);
        assert!(!fx.trades.dir().exists());
    }

    #[tokio::test]
    async fn rejected_order_is_terminated_without_polling() {
        let fx = fixture();
        let client = Arc::new(StuckExchange {
            status: Some(OrderStatus::Rejected),
            polls: AtomicUsize::new(0),
        });
        let exec = executor(client.clone(), &fx);

        let mut account = Account::default();
        let outcome = exec.execute(&mut account, OrderSide::Buy, "BTCUSDT", 0.001).await.unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Terminated { order_id: 9, status: OrderStatus::Rejected }
        );
        assert_eq!(client.polls.load(Ordering::Relaxed), 0);
        assert!(account.is_buying);
    }

    #[tokio::test]
    async fn trade_log_failure_keeps_account_unflipped() {
        let fx = fixture();
        std::fs::write(fx.trades.dir(), "not a directory").unwrap();
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        client.feed_closes("BTCUSDT", &[27_000.0]).await;
        let exec = executor(client, &fx);

        let mut account = fx.accounts.load().unwrap();
        let err = exec.execute(&mut account, OrderSide::Buy, "BTCUSDT", 0.001).await.unwrap_err();

        assert_eq!(err.kind(), common::ErrorKind::Persistence);
        assert!(account.is_buying);
        assert!(fx.accounts.load().unwrap().is_buying);
    }

    #[tokio::test]
    async fn activity_log_failure_does_not_undo_a_fill() {
        let fx = fixture();
        std::fs::write(fx.activity.dir(), "not a directory").unwrap();
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        client.feed_closes("BTCUSDT", &[27_000.0]).await;
        let exec = executor(client, &fx);

        let mut account = fx.accounts.load().unwrap();
        let outcome = exec.execute(&mut account, OrderSide::Buy, "BTCUSDT", 0.001).await.unwrap();

        assert!(matches!(outcome, ExecutionOutcome::Filled(_)));
        assert!(!account.is_buying);
        assert!(!fx.accounts.load().unwrap().is_buying);
        let csv = std::fs::read_dir(fx.trades.dir()).unwrap().next().unwrap().unwrap().path();
        assert_eq!(std::fs::read_to_string(csv).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn submission_error_propagates_and_keeps_state() {
        let fx = fixture();
        let client = Arc::new(StuckExchange { status: None, polls: AtomicUsize::new(0) });
        let exec = executor(client, &fx);

        let mut account = fx.accounts.load().unwrap();
        let err = exec.execute(&mut account, OrderSide::Buy, "BTCUSDT", 0.001).await.unwrap_err();

        assert_eq!(err.kind(), common::ErrorKind::Transient);
        assert!(account.is_buying);
        assert!(fx.accounts.load().unwrap().is_buying);
    }
}
