use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TradingError};

/// OHLCV candlestick for one kline interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
}

/// Direction of a new position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Side of the entry order
    pub fn entry_side(self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Side of the stop-loss / take-profit / closing orders
    pub fn exit_side(self) -> OrderSide {
        self.entry_side().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type with its trigger price, if any.
///
/// Both trigger kinds become market orders once the stop price is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    StopLoss { stop_price: Decimal },
    TakeProfit { stop_price: Decimal },
}

impl OrderKind {
    pub fn venue_type(&self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::StopLoss { .. } => "STOP_LOSS",
            OrderKind::TakeProfit { .. } => "TAKE_PROFIT",
        }
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        match self {
            OrderKind::Market => None,
            OrderKind::StopLoss { stop_price } | OrderKind::TakeProfit { stop_price } => {
                Some(*stop_price)
            }
        }
    }
}

/// A single order submission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub client_order_id: String,
}

/// Venue acknowledgment of a submitted order. Says nothing about fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub symbol: String,
    pub order_id: String,
    pub client_order_id: String,
    pub status: String,
    pub transact_time: Option<DateTime<Utc>>,
}

/// An order currently resting on the venue
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: String,
    pub client_order_id: String,
    pub side: OrderSide,
    pub order_type: String,
}

/// The three acknowledgments of a fully placed bracket
#[derive(Debug, Clone, PartialEq)]
pub struct BracketOrderResult {
    pub entry: OrderAck,
    pub stop_loss: OrderAck,
    pub take_profit: OrderAck,
}

/// Trading rules the venue enforces for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRules {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub min_qty: Decimal,
    pub step_size: Decimal,
    pub tick_size: Decimal,
    pub min_notional: Decimal,
}

impl SymbolRules {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }

    /// Snap a quantity down to the lot step and check it against venue minimums
    pub fn conform_quantity(&self, quantity: Decimal, price: f64) -> Result<Decimal> {
        let snapped = snap_down(quantity, self.step_size);

        if snapped <= Decimal::ZERO {
            return Err(TradingError::InvalidQuantity(format!(
                "{} rounds to zero at step size {}",
                quantity, self.step_size
            )));
        }

        if snapped <= self.step_size {
            return Err(TradingError::InvalidQuantity(format!(
                "{} does not exceed the minimum increment {} for {}",
                snapped, self.step_size, self.symbol
            )));
        }

        if snapped < self.min_qty {
            return Err(TradingError::InvalidQuantity(format!(
                "{} is below minimum quantity {} for {}",
                snapped, self.min_qty, self.symbol
            )));
        }

        let price = Decimal::from_f64(price).ok_or_else(|| {
            TradingError::InvalidQuantity(format!("price {} is not representable", price))
        })?;
        let notional = snapped * price;
        if notional < self.min_notional {
            return Err(TradingError::InvalidQuantity(format!(
                "notional {:.4} is below venue minimum {} for {}",
                notional, self.min_notional, self.symbol
            )));
        }

        Ok(snapped)
    }

    /// Round a trigger price to the venue tick size
    pub fn conform_price(&self, price: f64) -> Result<Decimal> {
        let price = Decimal::from_f64(price)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| {
                TradingError::InvalidQuantity(format!("trigger price {} is not valid", price))
            })?;

        if self.tick_size <= Decimal::ZERO {
            return Ok(price);
        }

        let steps = (price / self.tick_size).round();
        Ok((steps * self.tick_size).normalize())
    }
}

fn snap_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}
