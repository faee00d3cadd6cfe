// Order execution and data collection module
pub mod bracket;
pub mod executor;
pub mod gateway;
pub mod paper;
pub mod price_feed;

#[cfg(test)]
pub(crate) mod testing;

pub use bracket::{
    bracket_tag, place_bracket_order, BracketFailure, BracketLeg, BracketRequest, Compensation,
};
pub use executor::{ExecutionAction, ExecutionDecision, Executor};
pub use gateway::{count_open_positions, ExecutionGateway};
pub use paper::PaperGateway;
pub use price_feed::{closing_prices, interval_seconds, validate_candle_sequence, MarketDataSource};
