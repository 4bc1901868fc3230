use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{BotSettings, Config, ExchangeClient, TradingMode};
use engine::binance::{LIVE_URL, TESTNET_URL};
use engine::{BinanceClient, TradingLoop};
use paper::PaperClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let settings = BotSettings::load(&cfg.settings_path)?;
    info!(
        mode = %cfg.trading_mode,
        testnet = cfg.binance_testnet,
        symbol = %settings.bot.symbol,
        "RsiBot starting"
    );

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let base_url = if cfg.binance_testnet { TESTNET_URL } else { LIVE_URL };
    let exchange_client: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!(base_url, "Live trading mode — using BinanceClient");
            Arc::new(BinanceClient::new(
                &cfg.binance_api_key,
                &cfg.binance_secret,
                base_url,
            )?)
        }
        TradingMode::Paper => {
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode — using PaperClient");
            let market = Arc::new(BinanceClient::public(base_url)?);
            Arc::new(PaperClient::new(10_000.0, cfg.paper_slippage_bps).with_market_data(market))
        }
    };

    // ── Startup checks ────────────────────────────────────────────────────────
    let balance = exchange_client
        .asset_balance(&settings.bot.base_asset)
        .await
        .context("startup balance check failed")?;
    info!(asset = %balance.asset, free = balance.free, locked = balance.locked, "Balance");

    // ── Trading loop ──────────────────────────────────────────────────────────
    let mut bot = TradingLoop::new(exchange_client, settings)?;
    bot.prime().await;

    tokio::select! {
        _ = bot.run() => {}
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received. Exiting.");
        }
    }
    Ok(())
}
