//! Three-leg bracket placement: market entry, then stop-loss, then take-profit.
//!
//! The venue has no cross-order transaction, so a failed exit leg leaves a
//! live entry behind. When compensation is enabled the placed exit legs are
//! cancelled and the entry is flattened at market before the error surfaces.
//! An exit leg that failed without a definite rejection may still have been
//! booked, so it is cancelled by client id as well.

use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

use super::gateway::ExecutionGateway;
use crate::error::{Result, TradingError, UNKNOWN_ORDER_CODE};
use crate::models::{BracketOrderResult, Direction, OrderAck, OrderKind, OrderRequest};

const BRACKET_PREFIX: &str = "bb";
const BRACKET_ID_HEX_LEN: usize = 12;
const CLOSE_SUFFIX: &str = "cx";

/// Everything needed to submit one bracket, already conformed to venue rules
#[derive(Debug, Clone, PartialEq)]
pub struct BracketRequest {
    pub symbol: String,
    pub direction: Direction,
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub take_profit_price: Decimal,
    pub compensate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketLeg {
    Entry,
    StopLoss,
    TakeProfit,
}

impl BracketLeg {
    fn suffix(self) -> &'static str {
        match self {
            BracketLeg::Entry => "en",
            BracketLeg::StopLoss => "sl",
            BracketLeg::TakeProfit => "tp",
        }
    }
}

impl fmt::Display for BracketLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketLeg::Entry => write!(f, "entry"),
            BracketLeg::StopLoss => write!(f, "stop-loss"),
            BracketLeg::TakeProfit => write!(f, "take-profit"),
        }
    }
}

/// What happened to the live entry after an exit leg failed
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Entry itself failed, nothing to undo
    NotNeeded,
    /// Compensation disabled; entry left as is
    NotAttempted,
    /// Exit legs cancelled and entry closed at market
    Flattened {
        close_order_id: String,
        /// Order ids of acknowledged exits, client ids of unacknowledged ones
        cancelled: Vec<String>,
    },
    Failed {
        reason: String,
    },
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::NotNeeded => write!(f, "not needed"),
            Compensation::NotAttempted => write!(f, "not attempted"),
            Compensation::Flattened {
                close_order_id,
                cancelled,
            } => write!(
                f,
                "flattened by order {} (cancelled {:?})",
                close_order_id, cancelled
            ),
            Compensation::Failed { reason } => write!(f, "FAILED: {}", reason),
        }
    }
}

/// Context of a bracket that did not complete
#[derive(Debug, Clone, PartialEq)]
pub struct BracketFailure {
    pub symbol: String,
    pub bracket_id: String,
    pub direction: Direction,
    pub failed_leg: BracketLeg,
    /// Upstream venue / transport message
    pub message: String,
    pub entry_order_id: Option<String>,
    /// Acknowledgments of the legs that were placed before the failure
    pub placed: Vec<OrderAck>,
    pub compensation: Compensation,
}

impl BracketFailure {
    /// Entry is live and was not flattened
    pub fn is_unprotected(&self) -> bool {
        self.entry_order_id.is_some()
            && !matches!(self.compensation, Compensation::Flattened { .. })
    }

    pub fn placed_legs(&self) -> Vec<&str> {
        self.placed
            .iter()
            .map(|ack| ack.client_order_id.as_str())
            .collect()
    }
}

impl fmt::Display for BracketFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} bracket {}: {} leg failed: {}",
            self.symbol, self.direction, self.bracket_id, self.failed_leg, self.message
        )?;

        if let Some(entry) = &self.entry_order_id {
            write!(
                f,
                " (entry order {} is live, placed legs {:?}, compensation {})",
                entry,
                self.placed_legs(),
                self.compensation
            )?;
        }

        Ok(())
    }
}

/// Fresh bracket tag, e.g. `bb3f9a0c12d4e5`
pub fn new_bracket_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}{}", BRACKET_PREFIX, &hex[..BRACKET_ID_HEX_LEN])
}

fn leg_client_id(bracket_id: &str, suffix: &str) -> String {
    format!("{}-{}", bracket_id, suffix)
}

/// Bracket tag of a client order id, if it was placed as part of a bracket
pub fn bracket_tag(client_order_id: &str) -> Option<&str> {
    let (tag, suffix) = client_order_id.rsplit_once('-')?;

    let known_suffix = [
        BracketLeg::Entry.suffix(),
        BracketLeg::StopLoss.suffix(),
        BracketLeg::TakeProfit.suffix(),
        CLOSE_SUFFIX,
    ]
    .contains(&suffix);

    let hex = tag.strip_prefix(BRACKET_PREFIX)?;
    let well_formed = hex.len() == BRACKET_ID_HEX_LEN && hex.chars().all(|c| c.is_ascii_hexdigit());

    (known_suffix && well_formed).then_some(tag)
}

/// Submit entry, stop-loss and take-profit strictly in that order
///
/// Each leg waits for the previous acknowledgment. Any failure aborts the
/// remaining legs and returns [`TradingError::OrderPlacement`].
pub async fn place_bracket_order<G>(
    gateway: &G,
    request: &BracketRequest,
) -> Result<BracketOrderResult>
where
    G: ExecutionGateway + ?Sized,
{
    let bracket_id = new_bracket_id();
    let exit_side = request.direction.exit_side();

    let leg = |which: BracketLeg, kind: OrderKind| OrderRequest {
        symbol: request.symbol.clone(),
        side: if which == BracketLeg::Entry {
            request.direction.entry_side()
        } else {
            exit_side
        },
        kind,
        quantity: request.quantity,
        client_order_id: leg_client_id(&bracket_id, which.suffix()),
    };

    tracing::info!(
        "📤 {} bracket {} for {}: qty {} stop {} target {}",
        request.direction,
        bracket_id,
        request.symbol,
        request.quantity,
        request.stop_price,
        request.take_profit_price
    );

    // 1. Entry
    let entry = match submit(gateway, &leg(BracketLeg::Entry, OrderKind::Market)).await {
        Ok(ack) => ack,
        Err(e) => {
            return Err(failure(
                request,
                &bracket_id,
                BracketLeg::Entry,
                e,
                Vec::new(),
                Compensation::NotNeeded,
            ))
        }
    };

    // 2. Stop-loss
    let stop_order = leg(
        BracketLeg::StopLoss,
        OrderKind::StopLoss {
            stop_price: request.stop_price,
        },
    );
    let stop_loss = match submit(gateway, &stop_order).await {
        Ok(ack) => ack,
        Err(e) => {
            return Err(abort(
                gateway,
                request,
                &bracket_id,
                (BracketLeg::StopLoss, &stop_order),
                e,
                entry,
                Vec::new(),
            )
            .await)
        }
    };

    // 3. Take-profit
    let target_order = leg(
        BracketLeg::TakeProfit,
        OrderKind::TakeProfit {
            stop_price: request.take_profit_price,
        },
    );
    let take_profit = match submit(gateway, &target_order).await {
        Ok(ack) => ack,
        Err(e) => {
            return Err(abort(
                gateway,
                request,
                &bracket_id,
                (BracketLeg::TakeProfit, &target_order),
                e,
                entry,
                vec![stop_loss],
            )
            .await)
        }
    };

    tracing::info!(
        "✅ Bracket {} complete: entry {} / stop {} / target {}",
        bracket_id,
        entry.order_id,
        stop_loss.order_id,
        take_profit.order_id
    );

    Ok(BracketOrderResult {
        entry,
        stop_loss,
        take_profit,
    })
}

async fn submit<G>(gateway: &G, order: &OrderRequest) -> Result<OrderAck>
where
    G: ExecutionGateway + ?Sized,
{
    tracing::info!(
        "  → {} {} {} {} {}",
        order.client_order_id,
        order.kind.venue_type(),
        order.side,
        order.quantity,
        order
            .kind
            .stop_price()
            .map(|p| format!("@ {}", p))
            .unwrap_or_default()
    );

    match gateway.place_order(order).await {
        Ok(ack) => {
            tracing::info!(
                "  ✓ {} acknowledged as order {} ({})",
                order.client_order_id,
                ack.order_id,
                ack.status
            );
            Ok(ack)
        }
        Err(e) => {
            tracing::error!("  ✗ {} rejected: {}", order.client_order_id, e);
            Err(e)
        }
    }
}

/// An exit leg failed after the entry was placed
async fn abort<G>(
    gateway: &G,
    request: &BracketRequest,
    bracket_id: &str,
    (failed_leg, failed_order): (BracketLeg, &OrderRequest),
    error: TradingError,
    entry: OrderAck,
    exits: Vec<OrderAck>,
) -> TradingError
where
    G: ExecutionGateway + ?Sized,
{
    // Timeouts and resets say nothing about whether the venue booked the leg
    let unresolved = match &error {
        TradingError::Rejected { .. } => None,
        _ => Some(failed_order.client_order_id.as_str()),
    };

    let compensation = if request.compensate {
        compensate(gateway, request, bracket_id, &exits, unresolved).await
    } else {
        Compensation::NotAttempted
    };

    let mut placed = vec![entry];
    placed.extend(exits);

    failure(request, bracket_id, failed_leg, error, placed, compensation)
}

/// Cancel every exit leg that may be resting, then close the entry at market
async fn compensate<G>(
    gateway: &G,
    request: &BracketRequest,
    bracket_id: &str,
    exits: &[OrderAck],
    unresolved: Option<&str>,
) -> Compensation
where
    G: ExecutionGateway + ?Sized,
{
    tracing::warn!(
        "↩️  Compensating bracket {} on {}",
        bracket_id,
        request.symbol
    );

    let mut cancelled = Vec::new();
    for exit in exits {
        if let Err(e) = gateway.cancel_order(&request.symbol, &exit.order_id).await {
            // A live exit leg still guards the entry; closing now could leave it dangling
            return Compensation::Failed {
                reason: format!("could not cancel exit order {}: {}", exit.order_id, e),
            };
        }
        cancelled.push(exit.order_id.clone());
    }

    if let Some(client_order_id) = unresolved {
        match gateway
            .cancel_order_by_client_id(&request.symbol, client_order_id)
            .await
        {
            Ok(()) => {
                tracing::warn!("  {} was booked without an ack, cancelled", client_order_id);
                cancelled.push(client_order_id.to_string());
            }
            Err(TradingError::Rejected {
                code: UNKNOWN_ORDER_CODE,
                ..
            }) => {
                tracing::info!("  {} never reached the book", client_order_id);
            }
            Err(e) => {
                return Compensation::Failed {
                    reason: format!(
                        "could not cancel unacknowledged exit {}: {}",
                        client_order_id, e
                    ),
                };
            }
        }
    }

    let close = OrderRequest {
        symbol: request.symbol.clone(),
        side: request.direction.exit_side(),
        kind: OrderKind::Market,
        quantity: request.quantity,
        client_order_id: leg_client_id(bracket_id, CLOSE_SUFFIX),
    };

    match submit(gateway, &close).await {
        Ok(ack) => Compensation::Flattened {
            close_order_id: ack.order_id,
            cancelled,
        },
        Err(e) => Compensation::Failed {
            reason: format!("closing market order failed: {}", e),
        },
    }
}

fn failure(
    request: &BracketRequest,
    bracket_id: &str,
    failed_leg: BracketLeg,
    error: TradingError,
    placed: Vec<OrderAck>,
    compensation: Compensation,
) -> TradingError {
    let entry_order_id = placed.first().map(|ack| ack.order_id.clone());

    TradingError::OrderPlacement(Box::new(BracketFailure {
        symbol: request.symbol.clone(),
        bracket_id: bracket_id.to_string(),
        direction: request.direction,
        failed_leg,
        message: error.to_string(),
        entry_order_id,
        placed,
        compensation,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::testing::{ScriptedGateway, TEST_SYMBOL};
    use crate::models::OrderSide;

    fn request(compensate: bool) -> BracketRequest {
        BracketRequest {
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            quantity: Decimal::new(5, 2),
            stop_price: Decimal::new(95, 0),
            take_profit_price: Decimal::new(105, 0),
            compensate,
        }
    }

    fn bracket_failure(err: TradingError) -> BracketFailure {
        match err {
            TradingError::OrderPlacement(failure) => *failure,
            other => panic!("expected OrderPlacement, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_legs_are_placed_in_order() {
        let gateway = ScriptedGateway::new();

        let result = place_bracket_order(&gateway, &request(true)).await.unwrap();

        let orders = gateway.placed().await;
        assert_eq!(orders.len(), 3);

        assert_eq!(orders[0].kind, OrderKind::Market);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(
            orders[1].kind,
            OrderKind::StopLoss {
                stop_price: Decimal::new(95, 0)
            }
        );
        assert_eq!(orders[1].side, OrderSide::Sell);
        assert_eq!(
            orders[2].kind,
            OrderKind::TakeProfit {
                stop_price: Decimal::new(105, 0)
            }
        );
        assert_eq!(orders[2].side, OrderSide::Sell);
        assert!(orders.iter().all(|o| o.quantity == Decimal::new(5, 2)));

        assert_eq!(result.entry.order_id, "1");
        assert_eq!(result.stop_loss.order_id, "2");
        assert_eq!(result.take_profit.order_id, "3");
    }

    #[tokio::test]
    async fn test_short_bracket_exits_buy() {
        let gateway = ScriptedGateway::new();
        let mut req = request(true);
        req.direction = Direction::Short;

        place_bracket_order(&gateway, &req).await.unwrap();

        let orders = gateway.placed().await;
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_eq!(orders[1].side, OrderSide::Buy);
        assert_eq!(orders[2].side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn test_legs_share_bracket_tag() {
        let gateway = ScriptedGateway::new();
        place_bracket_order(&gateway, &request(true)).await.unwrap();

        let orders = gateway.placed().await;
        let tags: Vec<_> = orders
            .iter()
            .map(|o| bracket_tag(&o.client_order_id).unwrap().to_string())
            .collect();
        assert!(tags.iter().all(|t| t == &tags[0]));
        assert!(orders[0].client_order_id.ends_with("-en"));
        assert!(orders[1].client_order_id.ends_with("-sl"));
        assert!(orders[2].client_order_id.ends_with("-tp"));
    }

    #[tokio::test]
    async fn test_entry_failure_places_nothing_else() {
        let gateway = ScriptedGateway::new().fail_on_call(1);

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        assert!(!err.leaves_unprotected_position());

        let failure = bracket_failure(err);
        assert_eq!(failure.failed_leg, BracketLeg::Entry);
        assert_eq!(failure.entry_order_id, None);
        assert_eq!(failure.compensation, Compensation::NotNeeded);
        assert!(failure.message.contains("scripted failure"));
        assert_eq!(gateway.placed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_without_compensation_reports_entry() {
        let gateway = ScriptedGateway::new().fail_on_call(2);

        let err = place_bracket_order(&gateway, &request(false)).await.unwrap_err();
        assert!(err.leaves_unprotected_position());

        let message = err.to_string();
        let failure = bracket_failure(err);
        assert_eq!(failure.failed_leg, BracketLeg::StopLoss);
        assert_eq!(failure.entry_order_id.as_deref(), Some("1"));
        assert_eq!(failure.placed.len(), 1);
        assert_eq!(failure.compensation, Compensation::NotAttempted);
        assert!(message.contains("stop-loss"));
        assert!(message.contains("entry order 1"));

        // Take-profit never attempted
        assert_eq!(gateway.placed().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_failure_flattens_entry() {
        let gateway = ScriptedGateway::new().fail_on_call(2);

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        assert!(!err.leaves_unprotected_position());

        let failure = bracket_failure(err);
        assert_eq!(failure.failed_leg, BracketLeg::StopLoss);
        assert_eq!(failure.entry_order_id.as_deref(), Some("1"));
        assert!(matches!(
            failure.compensation,
            Compensation::Flattened { ref cancelled, .. } if cancelled.is_empty()
        ));

        let orders = gateway.placed().await;
        assert_eq!(orders.len(), 3);
        let close = &orders[2];
        assert_eq!(close.kind, OrderKind::Market);
        assert_eq!(close.side, OrderSide::Sell);
        assert_eq!(close.quantity, Decimal::new(5, 2));
        assert!(close.client_order_id.ends_with("-cx"));
    }

    #[tokio::test]
    async fn test_take_profit_failure_cancels_stop_then_flattens() {
        let gateway = ScriptedGateway::new().fail_on_call(3);

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        let failure = bracket_failure(err);

        assert_eq!(failure.failed_leg, BracketLeg::TakeProfit);
        assert_eq!(failure.placed.len(), 2);
        assert_eq!(
            failure.compensation,
            Compensation::Flattened {
                close_order_id: "4".to_string(),
                cancelled: vec!["2".to_string()],
            }
        );
        assert_eq!(gateway.cancelled().await, vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_unprotected() {
        // Stop-loss and the closing order both fail
        let gateway = ScriptedGateway::new().fail_on_call(2).fail_on_call(3);

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        assert!(err.leaves_unprotected_position());

        let failure = bracket_failure(err);
        assert!(matches!(failure.compensation, Compensation::Failed { .. }));
        assert_eq!(failure.entry_order_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_cancel_failure_skips_flatten() {
        let gateway = ScriptedGateway::new().fail_on_call(3).fail_cancels();

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        let failure = bracket_failure(err);

        assert!(
            matches!(failure.compensation, Compensation::Failed { ref reason } if reason.contains("cancel"))
        );
        // entry, stop, failed take-profit; no closing order
        assert_eq!(gateway.placed().await.len(), 3);
    }

    #[tokio::test]
    async fn test_timed_out_exit_booked_by_venue_is_cancelled() {
        let gateway = ScriptedGateway::new().time_out_after_booking(3);

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        assert!(!err.leaves_unprotected_position());

        let failure = bracket_failure(err);
        assert_eq!(failure.failed_leg, BracketLeg::TakeProfit);
        assert!(failure.message.contains("timed out"));
        assert_eq!(
            failure.compensation,
            Compensation::Flattened {
                close_order_id: "4".to_string(),
                cancelled: vec!["2".to_string(), format!("{}-tp", failure.bracket_id)],
            }
        );

        assert!(gateway.open_orders(TEST_SYMBOL).await.unwrap().is_empty());
        assert_eq!(gateway.open_position_count(TEST_SYMBOL).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_exit_never_booked_still_flattens() {
        let gateway = ScriptedGateway::new().time_out_before_booking(2);

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        assert!(!err.leaves_unprotected_position());

        let failure = bracket_failure(err);
        assert_eq!(failure.failed_leg, BracketLeg::StopLoss);
        assert_eq!(
            failure.compensation,
            Compensation::Flattened {
                close_order_id: "3".to_string(),
                cancelled: Vec::new(),
            }
        );
        assert!(gateway.cancelled().await.is_empty());
    }

    #[tokio::test]
    async fn test_uncancellable_timed_out_exit_is_unprotected() {
        let gateway = ScriptedGateway::new()
            .time_out_after_booking(2)
            .fail_cancels();

        let err = place_bracket_order(&gateway, &request(true)).await.unwrap_err();
        assert!(err.leaves_unprotected_position());

        let failure = bracket_failure(err);
        assert!(matches!(
            failure.compensation,
            Compensation::Failed { ref reason } if reason.contains("unacknowledged")
        ));
        // No closing order while the stop-loss may still be resting
        assert_eq!(gateway.placed().await.len(), 2);
        assert_eq!(gateway.open_position_count(TEST_SYMBOL).await.unwrap(), 1);
    }

    #[test]
    fn test_bracket_tag_parsing() {
        let id = new_bracket_id();
        assert_eq!(id.len(), 14);

        let sl = leg_client_id(&id, "sl");
        assert_eq!(bracket_tag(&sl), Some(id.as_str()));
        assert_eq!(bracket_tag(&leg_client_id(&id, "cx")), Some(id.as_str()));

        assert_eq!(bracket_tag("web_123456"), None);
        assert_eq!(bracket_tag("bbnothex!!!!!!-sl"), None);
        assert_eq!(bracket_tag(&leg_client_id(&id, "zz")), None);
    }
}
