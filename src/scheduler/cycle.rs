use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::TradingError;
use crate::execution::{
    closing_prices, ExecutionAction, ExecutionGateway, Executor, MarketDataSource,
};
use crate::indicators::IndicatorEngine;
use crate::models::BracketOrderResult;
use crate::strategy::{Strategy, TradeDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Fetch,
    Indicators,
    Decide,
    Execute,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Fetch => "fetch",
            CyclePhase::Indicators => "indicators",
            CyclePhase::Decide => "decide",
            CyclePhase::Execute => "execute",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
#[error("{symbol} cycle failed during {phase}: {source}")]
pub struct CycleError {
    pub symbol: String,
    pub phase: CyclePhase,
    #[source]
    pub source: TradingError,
}

impl CycleError {
    pub fn leaves_unprotected_position(&self) -> bool {
        self.source.leaves_unprotected_position()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Held(String),
    Opened(BracketOrderResult),
}

/// One fetch → indicators → decide → execute pass for a validated symbol
pub struct TradingCycle {
    market: Arc<dyn MarketDataSource>,
    gateway: Arc<dyn ExecutionGateway>,
    strategy: Box<dyn Strategy>,
    engine: IndicatorEngine,
    executor: Executor,
    interval: String,
    candle_limit: u32,
}

impl TradingCycle {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        gateway: Arc<dyn ExecutionGateway>,
        strategy: Box<dyn Strategy>,
        engine: IndicatorEngine,
        executor: Executor,
        interval: impl Into<String>,
        candle_limit: u32,
    ) -> Self {
        Self {
            market,
            gateway,
            strategy,
            engine,
            executor,
            interval: interval.into(),
            candle_limit,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.executor.rules().symbol
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub async fn run(&self) -> Result<CycleOutcome, CycleError> {
        let symbol = self.symbol();

        let candles = self
            .market
            .fetch_candles(symbol, &self.interval, self.candle_limit)
            .await
            .map_err(|e| self.fail(CyclePhase::Fetch, e))?;

        let closes = closing_prices(&candles);
        let snapshot = self
            .engine
            .compute(&closes)
            .map_err(|e| self.fail(CyclePhase::Indicators, e))?;

        let open_positions = self
            .gateway
            .open_position_count(symbol)
            .await
            .map_err(|e| self.fail(CyclePhase::Decide, e))?;

        let decision = self
            .strategy
            .decide(&snapshot, open_positions)
            .map_err(|e| self.fail(CyclePhase::Decide, e))?;

        tracing::info!(
            symbol = %symbol,
            price = snapshot.current_price,
            rsi = snapshot.rsi,
            ma = snapshot.moving_average,
            macd = snapshot.macd.value,
            macd_signal = snapshot.macd.signal_line,
            volatility = snapshot.volatility,
            open_positions,
            "{} decision: {}",
            self.strategy.name(),
            describe(&decision)
        );

        let execution = self
            .executor
            .process_decision(&decision)
            .map_err(|e| self.fail(CyclePhase::Execute, e))?;

        match execution.action {
            ExecutionAction::Skip => Ok(CycleOutcome::Held(execution.reason)),
            ExecutionAction::Execute(request) => {
                tracing::info!("📈 {}: {}", symbol, execution.reason);
                self.gateway
                    .place_bracket_order(&request)
                    .await
                    .map(CycleOutcome::Opened)
                    .map_err(|e| self.fail(CyclePhase::Execute, e))
            }
        }
    }

    fn fail(&self, phase: CyclePhase, source: TradingError) -> CycleError {
        CycleError {
            symbol: self.symbol().to_string(),
            phase,
            source,
        }
    }
}

fn describe(decision: &TradeDecision) -> String {
    match decision {
        TradeDecision::Hold(reason) => format!("HOLD ({})", reason),
        TradeDecision::Open(p) => format!(
            "OPEN {} at {:.8} (stop {:.8}, target {:.8}, qty {})",
            p.direction, p.entry_price, p.stop_price, p.take_profit_price, p.quantity
        ),
    }
}
