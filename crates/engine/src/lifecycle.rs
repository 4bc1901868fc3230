use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use common::{BotSettings, Error, ExchangeClient, Result};
use store::{AccountStore, ActivityLog, TradeLog};
use strategy::{RsiIndicator, RsiReadings, SignalEvaluator};

use crate::executor::{ExecutionOutcome, OrderExecutor};

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No crossing this cycle (or an undefined reading).
    Idle { rsi: Option<f64> },
    /// A crossing fired and an order was sent.
    Executed(ExecutionOutcome),
}

/// The trading loop and everything it threads through each iteration:
/// exchange handle, account store, the RSI reading pair and the executor.
pub struct TradingLoop {
    client: Arc<dyn ExchangeClient>,
    settings: BotSettings,
    accounts: AccountStore,
    activity: ActivityLog,
    indicator: RsiIndicator,
    evaluator: SignalEvaluator,
    executor: OrderExecutor,
    readings: RsiReadings,
    consecutive_failures: u32,
}

impl TradingLoop {
    pub fn new(client: Arc<dyn ExchangeClient>, settings: BotSettings) -> Result<Self> {
        settings.validate()?;
        let evaluator = SignalEvaluator::new(settings.signal.entry, settings.signal.exit)
            .map_err(|e| Error::Config(e.to_string()))?;

        let accounts = AccountStore::new(&settings.paths.account);
        let activity = ActivityLog::new(&settings.paths.activity_log_dir);
        let trades = TradeLog::new(&settings.paths.trade_log_dir);
        let executor = OrderExecutor::new(client.clone(), accounts.clone(), trades, activity.clone())
            .with_polling(settings.poll_interval(), settings.fill_timeout());

        Ok(Self {
            client,
            indicator: RsiIndicator::new(settings.indicator.period),
            evaluator,
            accounts,
            activity,
            executor,
            readings: RsiReadings::default(),
            consecutive_failures: 0,
            settings,
        })
    }

    pub fn readings(&self) -> RsiReadings {
        self.readings
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Fetch recent candles and compute the latest RSI. `None` when there are
    /// not enough candles for a reading.
    pub async fn read_rsi(&self) -> Result<Option<f64>> {
        let start = Utc::now() - self.settings.lookback();
        let klines = self
            .client
            .klines(&self.settings.bot.symbol, &self.settings.indicator.kline_interval, start)
            .await?;

        let rsi = self.indicator.compute_klines(&klines);
        if klines.len() < self.indicator.min_samples() {
            warn!(
                samples = klines.len(),
                needed = self.indicator.min_samples(),
                "Too few candles for an RSI reading"
            );
        } else if rsi.is_none() {
            debug!(samples = klines.len(), "Flat or invalid window, no RSI reading");
        }
        Ok(rsi)
    }

    /// Take the initial reading so the first iteration has a `previous` value.
    pub async fn prime(&mut self) {
        match self.read_rsi().await {
            Ok(rsi) => {
                info!(rsi = ?rsi, "Initial RSI reading");
                self.readings = RsiReadings::primed(rsi);
            }
            Err(e) => {
                warn!(error = %e, "Initial RSI reading failed, first cycle cannot signal");
                self.note(&format!("initial RSI reading failed: {e}"));
            }
        }
    }

    /// One iteration: load account, refresh RSI, evaluate, maybe trade.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let mut account = self.accounts.load()?;
        let rsi = self.read_rsi().await?;
        self.readings.advance(rsi);

        debug!(is_buying = account.is_buying, rsi = ?rsi, previous = ?self.readings.previous, "Tick");

        let Some(signal) = self.evaluator.evaluate_for(&account, &self.readings) else {
            return Ok(TickOutcome::Idle { rsi });
        };

        info!(
            signal = ?signal,
            previous = ?self.readings.previous,
            current = ?rsi,
            "RSI crossing detected"
        );
        let outcome = self
            .executor
            .execute(
                &mut account,
                signal.side(),
                &self.settings.bot.symbol,
                self.settings.bot.quantity,
            )
            .await?;

        match &outcome {
            ExecutionOutcome::Filled(_) => {}
            ExecutionOutcome::TimedOut { order_id, last_status } => self.note(&format!(
                "order {order_id} still {last_status} after {}s, crossing dropped; \
                 the order stays open on the exchange and a late fill will not flip the account",
                self.settings.execution.fill_timeout_secs
            )),
            ExecutionOutcome::Terminated { order_id, status } => {
                self.note(&format!("order {order_id} closed as {status}, crossing dropped"))
            }
        }

        Ok(TickOutcome::Executed(outcome))
    }

    /// Run forever: tick, report failures, sleep.
    pub async fn run(mut self) {
        info!(
            symbol = %self.settings.bot.symbol,
            entry = self.evaluator.entry(),
            exit = self.evaluator.exit(),
            "Trading loop running"
        );
        self.note("trading loop started");

        loop {
            match self.tick().await {
                Ok(_) => self.consecutive_failures = 0,
                Err(e) => self.report_failure(&e),
            }
            tokio::time::sleep(self.settings.loop_interval()).await;
        }
    }

    /// Log an iteration failure, escalating when failures keep repeating.
    pub fn report_failure(&mut self, err: &Error) {
        self.consecutive_failures += 1;
        let kind = err.kind();
        error!(kind = %kind, failures = self.consecutive_failures, error = %err, "Iteration failed");
        if let Err(log_err) = self.activity.record_error(kind, &err.to_string()) {
            error!(error = %log_err, "Failed to write activity log");
        }

        let threshold = self.settings.bot.failure_alert_threshold.max(1);
        if self.consecutive_failures % threshold == 0 {
            error!(
                failures = self.consecutive_failures,
                kind = %kind,
                "Persistent failure: iterations keep failing"
            );
            self.note(&format!(
                "ALERT {} consecutive failed iterations, latest [{kind}]: {err}",
                self.consecutive_failures
            ));
        }
    }

    fn note(&self, msg: &str) {
        if let Err(e) = self.activity.record(msg) {
            error!(error = %e, "Failed to write activity log");
        }
    }
}
