// Technical indicators module
// RSI, SMA and MACD via the `ta` crate, volatility as population std dev

pub mod engine;
pub mod volatility;

pub use engine::{IndicatorEngine, IndicatorPeriods, IndicatorSnapshot, MacdValue};
pub use volatility::population_std_dev;
