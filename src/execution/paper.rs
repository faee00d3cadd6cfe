use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::gateway::ExecutionGateway;
use crate::error::{Result, TradingError, UNKNOWN_ORDER_CODE};
use crate::models::{OpenOrder, OrderAck, OrderKind, OrderRequest, SymbolRules};

#[derive(Default)]
struct PaperBook {
    next_order_id: u64,
    resting: Vec<OpenOrder>,
}

impl PaperBook {
    fn cancel(
        &mut self,
        symbol: &str,
        id: &str,
        matches: impl Fn(&OpenOrder) -> bool,
    ) -> Result<()> {
        let before = self.resting.len();
        self.resting.retain(|o| !(o.symbol == symbol && matches(o)));

        if self.resting.len() == before {
            return Err(TradingError::Rejected {
                code: UNKNOWN_ORDER_CODE,
                message: format!("unknown order {} on {}", id, symbol),
            });
        }

        tracing::info!("🧪 [DRY RUN] Would cancel order {} on {}", id, symbol);
        Ok(())
    }
}

/// Dry-run gateway: venue metadata is real, orders are simulated in memory
///
/// Market orders fill immediately. Stop and take-profit legs rest until
/// cancelled; they never trigger.
pub struct PaperGateway {
    venue: Arc<dyn ExecutionGateway>,
    book: Mutex<PaperBook>,
}

impl PaperGateway {
    pub fn new(venue: Arc<dyn ExecutionGateway>) -> Self {
        Self {
            venue,
            book: Mutex::new(PaperBook {
                next_order_id: 1,
                resting: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn symbol_rules(&self, symbol: &str) -> Result<Option<SymbolRules>> {
        self.venue.symbol_rules(symbol).await
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let book = self.book.lock().await;
        Ok(book
            .resting
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let mut book = self.book.lock().await;
        let order_id = format!("paper-{}", book.next_order_id);
        book.next_order_id += 1;

        tracing::info!(
            "🧪 [DRY RUN] Would place {} {} {} {}{} ({})",
            order.kind.venue_type(),
            order.side,
            order.quantity,
            order.symbol,
            order
                .kind
                .stop_price()
                .map(|p| format!(" @ {}", p))
                .unwrap_or_default(),
            order.client_order_id
        );

        let status = match order.kind {
            OrderKind::Market => "FILLED",
            OrderKind::StopLoss { .. } | OrderKind::TakeProfit { .. } => {
                book.resting.push(OpenOrder {
                    symbol: order.symbol.clone(),
                    order_id: order_id.clone(),
                    client_order_id: order.client_order_id.clone(),
                    side: order.side,
                    order_type: order.kind.venue_type().to_string(),
                });
                "NEW"
            }
        };

        Ok(OrderAck {
            symbol: order.symbol.clone(),
            order_id,
            client_order_id: order.client_order_id.clone(),
            status: status.to_string(),
            transact_time: Some(Utc::now()),
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        self.book
            .lock()
            .await
            .cancel(symbol, order_id, |o| o.order_id == order_id)
    }

    async fn cancel_order_by_client_id(&self, symbol: &str, client_order_id: &str) -> Result<()> {
        self.book
            .lock()
            .await
            .cancel(symbol, client_order_id, |o| o.client_order_id == client_order_id)
    }
}
