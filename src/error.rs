use thiserror::Error;

use crate::execution::bracket::BracketFailure;

pub type Result<T> = std::result::Result<T, TradingError>;

/// Venue code for an order id it has no record of
pub const UNKNOWN_ORDER_CODE: i64 = -2011;

#[derive(Debug, Error)]
pub enum TradingError {
    /// Transport, auth or venue-side outage
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Venue understood the request and refused it
    #[error("venue rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("malformed venue response: {0}")]
    MalformedResponse(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid indicator snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid order quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    OrderPlacement(Box<BracketFailure>),
}

impl TradingError {
    /// True when a live position may have been left without exit orders
    pub fn leaves_unprotected_position(&self) -> bool {
        match self {
            TradingError::OrderPlacement(failure) => failure.is_unprotected(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TradingError {
    fn from(e: reqwest::Error) -> Self {
        TradingError::Connectivity(e.to_string())
    }
}
