use anyhow::{bail, Context};
use bracketbot::api::BinanceClient;
use bracketbot::config::{resolve_credentials, resolve_symbol, Settings};
use bracketbot::execution::{ExecutionGateway, Executor, MarketDataSource, PaperGateway};
use bracketbot::indicators::{IndicatorEngine, IndicatorPeriods};
use bracketbot::scheduler::{Scheduler, TradingCycle};
use bracketbot::strategy::SignalEngine;
use clap::Parser;
use std::io;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bracketbot")]
#[command(about = "Indicator-driven bracket order bot for Binance spot", long_about = None)]
struct Cli {
    /// Trading pair, e.g. BTCUSDT (prompted when absent)
    #[arg(short, long)]
    symbol: Option<String>,

    /// Candle interval, e.g. 1m, 15m, 1h
    #[arg(short, long)]
    interval: Option<String>,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Simulate orders instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    tracing::info!("🚀 BracketBot starting");

    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(symbol) = cli.symbol {
        settings.market.symbol = symbol;
    }
    if let Some(interval) = cli.interval {
        settings.market.interval = interval;
    }
    settings.execution.dry_run |= cli.dry_run;
    settings.validate().context("Invalid configuration")?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let symbol = resolve_symbol(&settings.market.symbol, &mut input, &mut output)
        .context("No trading symbol")?;

    let credentials = if settings.execution.dry_run {
        None
    } else {
        Some(
            resolve_credentials(
                &settings.exchange.api_key,
                &settings.exchange.api_secret,
                &mut input,
                &mut output,
            )
            .context("Missing API credentials")?,
        )
    };
    drop(input);

    let client = Arc::new(
        BinanceClient::from_settings(&settings.exchange, credentials)
            .context("Failed to create Binance client")?,
    );

    let gateway: Arc<dyn ExecutionGateway> = if settings.execution.dry_run {
        tracing::warn!("🧪 DRY RUN: orders are simulated, nothing is sent to the venue");
        Arc::new(PaperGateway::new(client.clone()))
    } else {
        client.clone()
    };
    let market: Arc<dyn MarketDataSource> = client.clone();

    // Startup validation is fatal: there is no trading context without it
    tracing::info!("🔍 Validating {} on {}...", symbol, client.base_url());
    if !gateway
        .validate_symbol(&symbol)
        .await
        .with_context(|| format!("Failed to validate symbol {}", symbol))?
    {
        bail!("{} is not listed or not currently trading", symbol);
    }
    let rules = gateway
        .symbol_rules(&symbol)
        .await
        .with_context(|| format!("Failed to load exchange rules for {}", symbol))?
        .with_context(|| format!("{} disappeared from exchange info", symbol))?;

    let strategy_config = settings.strategy.clone();

    tracing::info!("\n📊 Configuration:");
    tracing::info!(
        "  Symbol: {} ({}/{})",
        symbol,
        rules.base_asset,
        rules.quote_asset
    );
    tracing::info!(
        "  Interval: {} ({} candles)",
        settings.market.interval,
        settings.market.candle_limit
    );
    tracing::info!(
        "  RSI({}) {}/{}, SMA({}), MACD({},{},{})",
        strategy_config.rsi_period,
        strategy_config.rsi_oversold,
        strategy_config.rsi_overbought,
        strategy_config.ma_period,
        strategy_config.macd_fast,
        strategy_config.macd_slow,
        strategy_config.macd_signal
    );
    tracing::info!(
        "  Bracket: stop {}% / target {}%, {} {} per entry",
        strategy_config.stop_loss_pct * 100.0,
        strategy_config.take_profit_pct * 100.0,
        strategy_config.min_notional,
        rules.quote_asset
    );
    tracing::info!("  Position limit: {}", strategy_config.position_limit);
    tracing::info!(
        "  Filters: step {} / tick {} / min notional {}",
        rules.step_size,
        rules.tick_size,
        rules.min_notional
    );
    tracing::info!(
        "  Compensate failed brackets: {}",
        settings.execution.compensate_on_failure
    );

    let cycle = TradingCycle::new(
        market,
        gateway,
        Box::new(SignalEngine::new(strategy_config.clone())),
        IndicatorEngine::new(IndicatorPeriods::from(&strategy_config)),
        Executor::new(rules, settings.execution.compensate_on_failure),
        settings.market.interval.clone(),
        settings.market.candle_limit,
    );
    let scheduler = Scheduler::new(
        cycle,
        Duration::from_secs(settings.scheduler.poll_interval_secs),
    );

    tracing::info!("\nPress Ctrl+C to stop...\n");

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        })
        .await;

    tracing::info!("👋 BracketBot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bracketbot=info,bracketbot::strategy=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
