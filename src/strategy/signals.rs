use rust_decimal::prelude::*;
use serde::Deserialize;

use super::{HoldReason, OpenPosition, Strategy, TradeDecision};
use crate::error::{Result, TradingError};
use crate::indicators::IndicatorSnapshot;
use crate::models::Direction;

/// Configuration for signal generation
#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    pub rsi_period: usize,
    pub ma_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub volatility_threshold: f64, // Absolute price units
    pub position_limit: usize,     // Max concurrent positions per symbol
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub min_notional: f64,       // Quote currency spent per entry
    pub quantity_precision: u32, // Decimal places kept on quantity
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ma_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            volatility_threshold: 0.005,
            position_limit: 2,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.05,
            min_notional: 5.0,
            quantity_precision: 6,
        }
    }
}

/// Quantity bought with `notional` quote units at `price`
///
/// Rounded half away from zero to `precision` decimal places.
pub fn position_quantity(notional: f64, price: f64, precision: u32) -> Result<Decimal> {
    if !(price > 0.0) || !price.is_finite() {
        return Err(TradingError::InvalidSnapshot(format!(
            "current price must be positive, got {}",
            price
        )));
    }

    let quantity = Decimal::from_f64(notional / price)
        .ok_or_else(|| {
            TradingError::InvalidQuantity(format!("{} / {} is not representable", notional, price))
        })?
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);

    if quantity <= Decimal::ZERO {
        return Err(TradingError::InvalidQuantity(format!(
            "{} / {} rounds to zero at {} decimals",
            notional, price, precision
        )));
    }

    Ok(quantity)
}

/// Fixed-rule RSI / SMA / MACD / volatility decision engine
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    config: SignalConfig,
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    fn validate(snapshot: &IndicatorSnapshot) -> Result<()> {
        let fields = [
            ("current_price", snapshot.current_price),
            ("rsi", snapshot.rsi),
            ("moving_average", snapshot.moving_average),
            ("macd.value", snapshot.macd.value),
            ("macd.signal_line", snapshot.macd.signal_line),
            ("volatility", snapshot.volatility),
        ];

        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TradingError::InvalidSnapshot(format!(
                "{} is not a finite number ({})",
                name, value
            )));
        }

        if snapshot.current_price <= 0.0 {
            return Err(TradingError::InvalidSnapshot(format!(
                "current_price must be positive, got {}",
                snapshot.current_price
            )));
        }

        if snapshot.volatility < 0.0 {
            return Err(TradingError::InvalidSnapshot(format!(
                "volatility must be non-negative, got {}",
                snapshot.volatility
            )));
        }

        Ok(())
    }

    /// Which entry, if any, the indicators call for. LONG is checked first.
    fn entry_direction(&self, s: &IndicatorSnapshot) -> Option<Direction> {
        let active = s.volatility > self.config.volatility_threshold;

        let long = s.rsi < self.config.rsi_oversold
            && s.moving_average > s.current_price
            && s.macd.value > s.macd.signal_line
            && active;
        if long {
            return Some(Direction::Long);
        }

        let short = s.rsi > self.config.rsi_overbought
            && s.moving_average < s.current_price
            && s.macd.value < s.macd.signal_line
            && active;
        if short {
            return Some(Direction::Short);
        }

        None
    }

    /// (stop, take-profit) around the entry price. Fixed percentages, not volatility scaled.
    fn bracket_prices(&self, direction: Direction, price: f64) -> (f64, f64) {
        let stop = self.config.stop_loss_pct;
        let target = self.config.take_profit_pct;
        match direction {
            Direction::Long => (price * (1.0 - stop), price * (1.0 + target)),
            Direction::Short => (price * (1.0 + stop), price * (1.0 - target)),
        }
    }
}

impl Strategy for SignalEngine {
    fn decide(&self, snapshot: &IndicatorSnapshot, open_positions: usize) -> Result<TradeDecision> {
        if open_positions >= self.config.position_limit {
            return Ok(TradeDecision::Hold(HoldReason::PositionLimit {
                open: open_positions,
                limit: self.config.position_limit,
            }));
        }

        Self::validate(snapshot)?;

        let Some(direction) = self.entry_direction(snapshot) else {
            return Ok(TradeDecision::Hold(HoldReason::NoSignal));
        };

        let entry_price = snapshot.current_price;
        let (stop_price, take_profit_price) = self.bracket_prices(direction, entry_price);
        let quantity = position_quantity(
            self.config.min_notional,
            entry_price,
            self.config.quantity_precision,
        )?;

        Ok(TradeDecision::Open(OpenPosition {
            direction,
            entry_price,
            stop_price,
            take_profit_price,
            quantity,
        }))
    }

    fn name(&self) -> &str {
        "SignalEngine"
    }
}
