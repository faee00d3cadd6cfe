// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod scheduler;
pub mod strategy;

// Re-export commonly used types
pub use api::BinanceClient;
pub use error::{Result, TradingError};
pub use models::*;
pub use strategy::Strategy;
