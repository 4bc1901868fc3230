use crate::{Error, Result, TradingMode};

/// Process-level configuration loaded from environment variables at startup.
/// Trading parameters live in the TOML file named by `settings_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials. Empty in paper mode when not provided.
    pub binance_api_key: String,
    pub binance_secret: String,
    pub binance_testnet: bool,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_slippage_bps: f64,

    // Bot settings file path
    pub settings_path: String,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let trading_mode = match lookup("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let (binance_api_key, binance_secret) = match trading_mode {
            TradingMode::Live => (
                required(&lookup, "BINANCE_API_KEY")?,
                required(&lookup, "BINANCE_SECRET")?,
            ),
            TradingMode::Paper => (
                lookup("BINANCE_API_KEY").unwrap_or_default(),
                lookup("BINANCE_SECRET").unwrap_or_default(),
            ),
        };

        let binance_testnet = match lookup("BINANCE_TESTNET") {
            None => true,
            Some(v) => parse_bool(&v).ok_or_else(|| {
                Error::Config(format!("BINANCE_TESTNET must be true or false, got: '{v}'"))
            })?,
        };

        Ok(Config {
            binance_api_key,
            binance_secret,
            binance_testnet,
            trading_mode,
            paper_slippage_bps: lookup("PAPER_SLIPPAGE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            settings_path: lookup("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/bot.toml".to_string()),
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
