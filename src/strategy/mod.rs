// Trading strategy module
pub mod signals;

pub use signals::{position_quantity, SignalConfig, SignalEngine};

use rust_decimal::Decimal;
use std::fmt;

use crate::error::Result;
use crate::indicators::IndicatorSnapshot;
use crate::models::Direction;

/// Outcome of one decision. Lives for a single cycle, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeDecision {
    Hold(HoldReason),
    Open(OpenPosition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    PositionLimit { open: usize, limit: usize },
    NoSignal,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldReason::PositionLimit { open, limit } => {
                write!(f, "position limit reached ({}/{} open)", open, limit)
            }
            HoldReason::NoSignal => write!(f, "entry conditions not met"),
        }
    }
}

/// Entry plus its fixed bracket, sized from the minimum notional
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub quantity: Decimal,
}

/// Base trait for decision rules
pub trait Strategy: Send + Sync {
    /// Decide from the latest indicators and the number of positions already open
    fn decide(&self, snapshot: &IndicatorSnapshot, open_positions: usize) -> Result<TradeDecision>;

    /// Get strategy name
    fn name(&self) -> &str;
}
