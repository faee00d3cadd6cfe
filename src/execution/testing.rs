//! In-process venue double for unit tests

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::gateway::ExecutionGateway;
use crate::error::{Result, TradingError, UNKNOWN_ORDER_CODE};
use crate::models::{OpenOrder, OrderAck, OrderKind, OrderRequest, SymbolRules};

pub const TEST_SYMBOL: &str = "BTCUSDT";

pub fn test_rules(status: &str) -> SymbolRules {
    SymbolRules {
        symbol: TEST_SYMBOL.to_string(),
        status: status.to_string(),
        base_asset: "BTC".to_string(),
        quote_asset: "USDT".to_string(),
        min_qty: Decimal::new(1, 5),
        step_size: Decimal::new(1, 5),
        tick_size: Decimal::new(1, 2),
        min_notional: Decimal::new(5, 0),
    }
}

#[derive(Default)]
struct Journal {
    calls: usize,
    placed: Vec<OrderRequest>,
    cancelled: Vec<String>,
    resting: Vec<OpenOrder>,
}

impl Journal {
    fn rest(&mut self, order: &OrderRequest, order_id: &str) {
        if order.kind != OrderKind::Market {
            self.resting.push(OpenOrder {
                symbol: order.symbol.clone(),
                order_id: order_id.to_string(),
                client_order_id: order.client_order_id.clone(),
                side: order.side,
                order_type: order.kind.venue_type().to_string(),
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Reject,
    /// Venue books the order but the acknowledgment never arrives
    TimeoutAfterBooking,
    /// Request times out before the venue sees it
    TimeoutBeforeBooking,
}

/// Acknowledges every order with sequential ids unless told to fail a given call
///
/// Acknowledged stop and take-profit legs rest in the book until cancelled.
pub struct ScriptedGateway {
    status: String,
    faults: HashMap<usize, Fault>,
    fail_cancels: bool,
    open_orders: Vec<OpenOrder>,
    journal: Mutex<Journal>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            status: "TRADING".to_string(),
            faults: HashMap::new(),
            fail_cancels: false,
            open_orders: Vec::new(),
            journal: Mutex::new(Journal::default()),
        }
    }

    /// Reject the n-th `place_order` call (1-based)
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.faults.insert(call, Fault::Reject);
        self
    }

    /// Book the n-th order, then report a timeout instead of the ack
    pub fn time_out_after_booking(mut self, call: usize) -> Self {
        self.faults.insert(call, Fault::TimeoutAfterBooking);
        self
    }

    pub fn time_out_before_booking(mut self, call: usize) -> Self {
        self.faults.insert(call, Fault::TimeoutBeforeBooking);
        self
    }

    pub fn fail_cancels(mut self) -> Self {
        self.fail_cancels = true;
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_open_orders(mut self, orders: Vec<OpenOrder>) -> Self {
        self.open_orders = orders;
        self
    }

    /// Every order submitted, including rejected ones
    pub async fn placed(&self) -> Vec<OrderRequest> {
        self.journal.lock().await.placed.clone()
    }

    /// Ids of cancelled orders, as passed to the cancel call
    pub async fn cancelled(&self) -> Vec<String> {
        self.journal.lock().await.cancelled.clone()
    }
}

#[async_trait]
impl ExecutionGateway for ScriptedGateway {
    async fn symbol_rules(&self, symbol: &str) -> Result<Option<SymbolRules>> {
        Ok((symbol == TEST_SYMBOL).then(|| test_rules(&self.status)))
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>> {
        let journal = self.journal.lock().await;
        Ok(self
            .open_orders
            .iter()
            .chain(journal.resting.iter())
            .cloned()
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let mut journal = self.journal.lock().await;
        journal.calls += 1;
        journal.placed.push(order.clone());
        let call = journal.calls;
        let order_id = call.to_string();

        match self.faults.get(&call) {
            Some(Fault::Reject) => {
                return Err(TradingError::Rejected {
                    code: -2010,
                    message: format!("scripted failure on call {}", call),
                })
            }
            Some(Fault::TimeoutAfterBooking) => {
                journal.rest(order, &order_id);
                return Err(TradingError::Connectivity("operation timed out".to_string()));
            }
            Some(Fault::TimeoutBeforeBooking) => {
                return Err(TradingError::Connectivity("operation timed out".to_string()));
            }
            None => journal.rest(order, &order_id),
        }

        Ok(OrderAck {
            symbol: order.symbol.clone(),
            order_id,
            client_order_id: order.client_order_id.clone(),
            status: "NEW".to_string(),
            transact_time: None,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        if self.fail_cancels {
            return Err(TradingError::Connectivity(
                "scripted cancel failure".to_string(),
            ));
        }
        let mut journal = self.journal.lock().await;
        journal.resting.retain(|o| o.order_id != order_id);
        journal.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn cancel_order_by_client_id(&self, _symbol: &str, client_order_id: &str) -> Result<()> {
        if self.fail_cancels {
            return Err(TradingError::Connectivity(
                "scripted cancel failure".to_string(),
            ));
        }
        let mut journal = self.journal.lock().await;
        let before = journal.resting.len();
        journal
            .resting
            .retain(|o| o.client_order_id != client_order_id);

        if journal.resting.len() == before {
            return Err(TradingError::Rejected {
                code: UNKNOWN_ORDER_CODE,
                message: "Unknown order sent.".to_string(),
            });
        }
        journal.cancelled.push(client_order_id.to_string());
        Ok(())
    }
}
