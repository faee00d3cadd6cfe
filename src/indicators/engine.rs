use serde::{Deserialize, Serialize};
use ta::indicators::{
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::Next;

use super::volatility::population_std_dev;
use crate::error::{Result, TradingError};
use crate::strategy::signals::SignalConfig;

/// MACD line and its signal line at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub value: f64,
    pub signal_line: f64,
}

/// Latest indicator readings for one analysis cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub moving_average: f64,
    pub macd: MacdValue,
    pub volatility: f64,
    pub current_price: f64,
}

/// Indicator lookback periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorPeriods {
    pub rsi: usize,
    pub moving_average: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            rsi: 14,
            moving_average: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl From<&SignalConfig> for IndicatorPeriods {
    fn from(config: &SignalConfig) -> Self {
        Self {
            rsi: config.rsi_period,
            moving_average: config.ma_period,
            macd_fast: config.macd_fast,
            macd_slow: config.macd_slow,
            macd_signal: config.macd_signal,
        }
    }
}

/// Turns a closing-price series into an [`IndicatorSnapshot`]
///
/// RSI, SMA and MACD (EMA oscillator and EMA signal line) come from the `ta`
/// crate. Every call builds fresh indicator state, so `compute` is a pure
/// function of its input.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    periods: IndicatorPeriods,
}

impl IndicatorEngine {
    pub fn new(periods: IndicatorPeriods) -> Self {
        Self { periods }
    }

    pub fn periods(&self) -> IndicatorPeriods {
        self.periods
    }

    /// Closes needed before MACD's signal line stops warming up
    pub fn min_closes_required(&self) -> usize {
        self.periods.macd_slow + self.periods.macd_signal
    }

    /// Compute the latest snapshot from closes ordered oldest first
    pub fn compute(&self, closes: &[f64]) -> Result<IndicatorSnapshot> {
        let current_price = *closes.last().ok_or_else(|| {
            TradingError::InsufficientData("no closing prices to analyze".to_string())
        })?;

        if closes.len() < self.min_closes_required() {
            tracing::warn!(
                "Only {} closes available ({} recommended), indicators are still warming up",
                closes.len(),
                self.min_closes_required()
            );
        }

        let mut rsi = RelativeStrengthIndex::new(self.periods.rsi).map_err(indicator_error)?;
        let mut sma =
            SimpleMovingAverage::new(self.periods.moving_average).map_err(indicator_error)?;
        let mut macd = MovingAverageConvergenceDivergence::new(
            self.periods.macd_fast,
            self.periods.macd_slow,
            self.periods.macd_signal,
        )
        .map_err(indicator_error)?;

        let mut rsi_series = Vec::with_capacity(closes.len());
        let mut sma_series = Vec::with_capacity(closes.len());
        let mut macd_series = Vec::with_capacity(closes.len());

        for &close in closes {
            rsi_series.push(rsi.next(close));
            sma_series.push(sma.next(close));

            let output = macd.next(close);
            macd_series.push(MacdValue {
                value: output.macd,
                signal_line: output.signal,
            });
        }

        // Always read the last element rather than assuming full-length series
        let snapshot = IndicatorSnapshot {
            rsi: latest(&rsi_series, "RSI")?,
            moving_average: latest(&sma_series, "SMA")?,
            macd: latest(&macd_series, "MACD")?,
            volatility: population_std_dev(closes).ok_or_else(|| {
                TradingError::InsufficientData("volatility needs at least one price".to_string())
            })?,
            current_price,
        };

        tracing::debug!(
            "Indicators: RSI={:.2}, SMA={:.4}, MACD={:.4}/{:.4}, Vol={:.4}, Price={:.4}",
            snapshot.rsi,
            snapshot.moving_average,
            snapshot.macd.value,
            snapshot.macd.signal_line,
            snapshot.volatility,
            snapshot.current_price
        );

        Ok(snapshot)
    }
}

fn latest<T: Copy>(series: &[T], name: &str) -> Result<T> {
    series
        .last()
        .copied()
        .ok_or_else(|| TradingError::InsufficientData(format!("{} series is empty", name)))
}

fn indicator_error(e: ta::errors::TaError) -> TradingError {
    TradingError::InvalidConfig(format!("invalid indicator period: {:?}", e))
}
