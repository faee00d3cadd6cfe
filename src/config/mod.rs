// Runtime configuration: built-in defaults, optional TOML file, BRACKETBOT_* env
pub mod credentials;

pub use credentials::{resolve_credentials, resolve_symbol, Credentials};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Result, TradingError};
use crate::strategy::signals::SignalConfig;

pub const DEFAULT_CONFIG_FILE: &str = "bracketbot.toml";
const ENV_PREFIX: &str = "BRACKETBOT";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub market: MarketSettings,
    pub strategy: SignalConfig,
    pub scheduler: SchedulerSettings,
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketSettings {
    pub symbol: String,
    pub interval: String,
    pub candle_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    pub dry_run: bool,
    pub compensate_on_failure: bool,
}

impl Settings {
    /// Load settings, layering defaults < TOML file (optional) < environment
    ///
    /// Environment keys use `__` between sections, e.g.
    /// `BRACKETBOT_EXCHANGE__API_KEY` or `BRACKETBOT_STRATEGY__POSITION_LIMIT`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path.unwrap_or(DEFAULT_CONFIG_FILE);
        let defaults = SignalConfig::default();

        let builder = Config::builder()
            .set_default("exchange.base_url", "https://api.binance.com")
            .and_then(|b| b.set_default("exchange.api_key", ""))
            .and_then(|b| b.set_default("exchange.api_secret", ""))
            .and_then(|b| b.set_default("exchange.recv_window_ms", 5000))
            .and_then(|b| b.set_default("exchange.requests_per_minute", 600))
            .and_then(|b| b.set_default("exchange.timeout_secs", 10))
            .and_then(|b| b.set_default("market.symbol", ""))
            .and_then(|b| b.set_default("market.interval", "1h"))
            .and_then(|b| b.set_default("market.candle_limit", 100))
            .and_then(|b| b.set_default("strategy.rsi_period", defaults.rsi_period as u64))
            .and_then(|b| b.set_default("strategy.ma_period", defaults.ma_period as u64))
            .and_then(|b| b.set_default("strategy.macd_fast", defaults.macd_fast as u64))
            .and_then(|b| b.set_default("strategy.macd_slow", defaults.macd_slow as u64))
            .and_then(|b| b.set_default("strategy.macd_signal", defaults.macd_signal as u64))
            .and_then(|b| b.set_default("strategy.rsi_oversold", defaults.rsi_oversold))
            .and_then(|b| b.set_default("strategy.rsi_overbought", defaults.rsi_overbought))
            .and_then(|b| {
                b.set_default(
                    "strategy.volatility_threshold",
                    defaults.volatility_threshold,
                )
            })
            .and_then(|b| b.set_default("strategy.position_limit", defaults.position_limit as u64))
            .and_then(|b| b.set_default("strategy.stop_loss_pct", defaults.stop_loss_pct))
            .and_then(|b| b.set_default("strategy.take_profit_pct", defaults.take_profit_pct))
            .and_then(|b| b.set_default("strategy.min_notional", defaults.min_notional))
            .and_then(|b| {
                b.set_default(
                    "strategy.quantity_precision",
                    defaults.quantity_precision as u64,
                )
            })
            .and_then(|b| b.set_default("scheduler.poll_interval_secs", 5))
            .and_then(|b| b.set_default("execution.dry_run", false))
            .and_then(|b| b.set_default("execution.compensate_on_failure", true))
            .map_err(config_error)?;

        let settings: Settings = builder
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        Ok(settings)
    }

    /// Reject settings that would make the decision rule meaningless
    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;

        for (name, period) in [
            ("rsi_period", s.rsi_period),
            ("ma_period", s.ma_period),
            ("macd_fast", s.macd_fast),
            ("macd_slow", s.macd_slow),
            ("macd_signal", s.macd_signal),
        ] {
            if period == 0 {
                return Err(TradingError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }

        if s.macd_fast >= s.macd_slow {
            return Err(TradingError::InvalidConfig(format!(
                "macd_fast ({}) must be shorter than macd_slow ({})",
                s.macd_fast, s.macd_slow
            )));
        }

        if !(s.min_notional > 0.0) {
            return Err(TradingError::InvalidConfig(
                "min_notional must be positive".to_string(),
            ));
        }

        for (name, pct) in [
            ("stop_loss_pct", s.stop_loss_pct),
            ("take_profit_pct", s.take_profit_pct),
        ] {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(TradingError::InvalidConfig(format!(
                    "{} must be in (0, 1), got {}",
                    name, pct
                )));
            }
        }

        if s.position_limit == 0 {
            return Err(TradingError::InvalidConfig(
                "position_limit must be at least 1".to_string(),
            ));
        }

        if self.scheduler.poll_interval_secs == 0 {
            return Err(TradingError::InvalidConfig(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }

        if self.market.candle_limit == 0 || self.market.candle_limit > 1000 {
            return Err(TradingError::InvalidConfig(format!(
                "candle_limit must be within 1..=1000, got {}",
                self.market.candle_limit
            )));
        }

        if self.exchange.requests_per_minute == 0 {
            return Err(TradingError::InvalidConfig(
                "requests_per_minute must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn config_error(e: config::ConfigError) -> TradingError {
    TradingError::InvalidConfig(e.to_string())
}
