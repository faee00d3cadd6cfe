pub mod binance;

pub use binance::{BinanceClient, BINANCE_API_BASE};
