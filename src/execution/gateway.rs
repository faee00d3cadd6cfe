use async_trait::async_trait;
use std::collections::HashSet;

use super::bracket::{self, bracket_tag, BracketRequest};
use crate::api::BinanceClient;
use crate::error::Result;
use crate::models::{BracketOrderResult, OpenOrder, OrderAck, OrderRequest, SymbolRules};

/// Order-side boundary to the venue
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Exchange metadata for `symbol`, `None` when it is not listed
    async fn symbol_rules(&self, symbol: &str) -> Result<Option<SymbolRules>>;

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;

    /// Submit a single order and wait for the acknowledgment
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// Cancel by client order id. Fails with `Rejected` carrying
    /// [`UNKNOWN_ORDER_CODE`](crate::error::UNKNOWN_ORDER_CODE) when the venue
    /// never booked the order.
    async fn cancel_order_by_client_id(&self, symbol: &str, client_order_id: &str) -> Result<()>;

    /// Listed and currently trading. Unlisted is `Ok(false)`, not an error.
    async fn validate_symbol(&self, symbol: &str) -> Result<bool> {
        Ok(self
            .symbol_rules(symbol)
            .await?
            .is_some_and(|rules| rules.is_trading()))
    }

    /// Outstanding orders for `symbol`, one per bracket
    async fn open_position_count(&self, symbol: &str) -> Result<usize> {
        let orders = self.open_orders(symbol).await?;
        Ok(count_open_positions(&orders))
    }

    async fn place_bracket_order(&self, request: &BracketRequest) -> Result<BracketOrderResult> {
        bracket::place_bracket_order(self, request).await
    }
}

/// Resting legs sharing a bracket tag count once; untagged orders count individually
pub fn count_open_positions(orders: &[OpenOrder]) -> usize {
    let mut brackets = HashSet::new();
    let mut untagged = 0;

    for order in orders {
        match bracket_tag(&order.client_order_id) {
            Some(tag) => {
                brackets.insert(tag);
            }
            None => untagged += 1,
        }
    }

    brackets.len() + untagged
}

#[async_trait]
impl ExecutionGateway for BinanceClient {
    async fn symbol_rules(&self, symbol: &str) -> Result<Option<SymbolRules>> {
        self.exchange_info(symbol).await
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        BinanceClient::open_orders(self, symbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        self.new_order(order).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        BinanceClient::cancel_order(self, symbol, order_id).await
    }

    async fn cancel_order_by_client_id(&self, symbol: &str, client_order_id: &str) -> Result<()> {
        BinanceClient::cancel_order_by_client_id(self, symbol, client_order_id).await
    }
}
