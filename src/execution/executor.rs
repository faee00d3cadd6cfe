use crate::error::{Result, TradingError};
use crate::execution::bracket::BracketRequest;
use crate::models::{Direction, SymbolRules};
use crate::strategy::{OpenPosition, TradeDecision};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Execute(BracketRequest),
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

/// Turns trade decisions into venue-conformant bracket orders for one symbol
pub struct Executor {
    rules: SymbolRules,
    compensate: bool,
}

impl Executor {
    pub fn new(rules: SymbolRules, compensate: bool) -> Self {
        Self { rules, compensate }
    }

    pub fn rules(&self) -> &SymbolRules {
        &self.rules
    }

    /// Process a decision and work out what to send
    ///
    /// Fails with `InvalidQuantity` when the position cannot be expressed
    /// within the symbol's lot, tick or notional filters.
    pub fn process_decision(&self, decision: &TradeDecision) -> Result<ExecutionDecision> {
        match decision {
            TradeDecision::Hold(reason) => Ok(ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: format!("Hold: {}", reason),
            }),

            TradeDecision::Open(position) => {
                let request = self.bracket_request(position)?;
                let reason = format!(
                    "{} signal at {:.8}, qty {} (stop {}, target {})",
                    position.direction,
                    position.entry_price,
                    request.quantity,
                    request.stop_price,
                    request.take_profit_price
                );

                Ok(ExecutionDecision {
                    action: ExecutionAction::Execute(request),
                    reason,
                })
            }
        }
    }

    fn bracket_request(&self, position: &OpenPosition) -> Result<BracketRequest> {
        let quantity = self
            .rules
            .conform_quantity(position.quantity, position.entry_price)?;
        let stop_price = self.rules.conform_price(position.stop_price)?;
        let take_profit_price = self.rules.conform_price(position.take_profit_price)?;

        // Tick rounding must not collapse or invert the bracket
        let ordered = match position.direction {
            Direction::Long => stop_price < take_profit_price,
            Direction::Short => stop_price > take_profit_price,
        };
        if !ordered {
            return Err(TradingError::InvalidQuantity(format!(
                "{} bracket collapses at tick size {} (stop {}, target {})",
                position.direction, self.rules.tick_size, stop_price, take_profit_price
            )));
        }

        Ok(BracketRequest {
            symbol: self.rules.symbol.clone(),
            direction: position.direction,
            quantity,
            stop_price,
            take_profit_price,
            compensate: self.compensate,
        })
    }
}
