use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result};

/// Trading parameters, read from a TOML file. Every key is optional.
///
/// Example `config/bot.toml`:
/// ```toml
/// [bot]
/// symbol = "BTCUSDT"
/// base_asset = "BTC"
/// quantity = 0.001
/// loop_interval_secs = 3
///
/// [indicator]
/// period = 14
/// kline_interval = "1m"
/// lookback_minutes = 60
///
/// [signal]
/// entry = 38.0
/// exit = 78.0
///
/// [execution]
/// poll_interval_ms = 1000
/// fill_timeout_secs = 30
///
/// [paths]
/// account = "data/account.json"
/// activity_log_dir = "logs/activity"
/// trade_log_dir = "logs/trades"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BotSettings {
    pub bot: BotSection,
    pub indicator: IndicatorSection,
    pub signal: SignalSection,
    pub execution: ExecutionSection,
    pub paths: PathsSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BotSection {
    /// Trading pair, e.g. "BTCUSDT".
    pub symbol: String,
    /// Base asset of the pair, queried for the startup balance check.
    pub base_asset: String,
    /// Order quantity in base asset units.
    pub quantity: f64,
    pub loop_interval_secs: u64,
    /// Consecutive failed iterations before a persistent-failure alert.
    pub failure_alert_threshold: u32,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quantity: 0.001,
            loop_interval_secs: 3,
            failure_alert_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorSection {
    pub period: usize,
    pub kline_interval: String,
    pub lookback_minutes: i64,
}

impl Default for IndicatorSection {
    fn default() -> Self {
        Self {
            period: 14,
            kline_interval: "1m".to_string(),
            lookback_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalSection {
    /// RSI level whose downward crossing triggers a buy.
    pub entry: f64,
    /// RSI level whose upward crossing triggers a sell.
    pub exit: f64,
}

impl Default for SignalSection {
    fn default() -> Self {
        Self {
            entry: 38.0,
            exit: 78.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub poll_interval_ms: u64,
    pub fill_timeout_secs: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            fill_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsSection {
    pub account: PathBuf,
    pub activity_log_dir: PathBuf,
    pub trade_log_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            account: PathBuf::from("data/account.json"),
            activity_log_dir: PathBuf::from("logs/activity"),
            trade_log_dir: PathBuf::from("logs/trades"),
        }
    }
}

impl BotSettings {
    /// Load from a TOML file. A missing file yields the defaults; a file that
    /// exists but does not parse is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read settings at '{}': {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Settings at '{}': {e}", path.display())))
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: BotSettings =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot.symbol.trim().is_empty() {
            return Err(Error::Config("bot.symbol must not be empty".into()));
        }
        if !(self.bot.quantity > 0.0) {
            return Err(Error::Config(format!(
                "bot.quantity must be positive, got {}",
                self.bot.quantity
            )));
        }
        if self.indicator.period < 2 {
            return Err(Error::Config("indicator.period must be >= 2".into()));
        }
        if self.indicator.lookback_minutes <= 0 {
            return Err(Error::Config("indicator.lookback_minutes must be positive".into()));
        }
        let candle_secs = interval_secs(&self.indicator.kline_interval)?;
        let needed = candle_secs * (self.indicator.period as i64 + 1);
        if self.indicator.lookback_minutes * 60 < needed {
            return Err(Error::Config(format!(
                "indicator.lookback_minutes ({}) is too short for {} '{}' candles, need at least {}",
                self.indicator.lookback_minutes,
                self.indicator.period + 1,
                self.indicator.kline_interval,
                (needed + 59) / 60
            )));
        }
        let SignalSection { entry, exit } = self.signal;
        if !(0.0..=100.0).contains(&entry) || !(0.0..=100.0).contains(&exit) {
            return Err(Error::Config(format!(
                "signal thresholds must lie in [0, 100], got entry={entry} exit={exit}"
            )));
        }
        if entry >= exit {
            return Err(Error::Config(format!(
                "signal.entry ({entry}) must be below signal.exit ({exit})"
            )));
        }
        Ok(())
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.bot.loop_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.execution.poll_interval_ms)
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.fill_timeout_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.indicator.lookback_minutes)
    }
}

/// Length of a Binance kline interval ("1s", "15m", "4h", "1d", "1w", "1M")
/// in seconds. A month counts as 31 days.
pub fn interval_secs(interval: &str) -> Result<i64> {
    let invalid = || {
        Error::Config(format!("indicator.kline_interval '{interval}' is not a kline interval"))
    };
    let unit = interval.chars().last().ok_or_else(invalid)?;
    let count: i64 = interval[..interval.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    let unit_secs = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 7 * 86_400,
        'M' => 31 * 86_400,
        _ => return Err(invalid()),
    };
    if count <= 0 {
        return Err(invalid());
    }
    Ok(count * unit_secs)
}
