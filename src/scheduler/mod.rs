// Periodic trading loop
pub mod cycle;

pub use cycle::{CycleError, CycleOutcome, CyclePhase, TradingCycle};

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::TradingError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum TickResult {
    /// Cycle started on its own task
    Spawned(JoinHandle<()>),
    /// Previous cycle still running
    Skipped,
}

/// Fixed-period driver that never runs two cycles at once
///
/// Each tick takes a single-slot guard and holds it until every order leg of
/// the cycle has finished. A tick that finds the slot busy is dropped, so the
/// open-position read and the placement that follows it cannot interleave
/// with another cycle.
pub struct Scheduler {
    cycle: Arc<TradingCycle>,
    period: Duration,
    slot: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(cycle: TradingCycle, period: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            period,
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start one cycle unless the previous one is still in flight
    pub fn tick(&self) -> TickResult {
        let guard = match self.slot.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(
                    "⏭️  Previous {} cycle still running, skipping tick",
                    self.cycle.symbol()
                );
                return TickResult::Skipped;
            }
        };

        let cycle = self.cycle.clone();
        let symbol = cycle.symbol().to_string();
        TickResult::Spawned(tokio::spawn(async move {
            // Inner task so a panicking cycle still reaches the boundary log
            match tokio::spawn(async move { cycle.run().await }).await {
                Ok(result) => report(&symbol, result),
                Err(e) => tracing::error!(symbol = %symbol, "💥 Cycle task failed: {}", e),
            }
            drop(guard);
        }))
    }

    /// Tick until `shutdown` resolves. Cycle failures never stop the loop.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            "🔄 Trading {} on {} candles every {:?}",
            self.cycle.symbol(),
            self.cycle.interval(),
            self.period
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("🛑 Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    tracing::info!("💹 [TRADING] Tick at {}", Utc::now().format("%H:%M:%S"));
                    self.tick();
                }
            }
        }

        // Let an in-flight cycle finish its order legs
        drop(self.slot.lock().await);
    }
}

/// Log a finished cycle at the boundary
fn report(symbol: &str, result: Result<CycleOutcome, CycleError>) {
    let err = match result {
        Ok(CycleOutcome::Held(reason)) => {
            tracing::info!("⏸️  {} - {}", symbol, reason);
            return;
        }
        Ok(CycleOutcome::Opened(bracket)) => {
            tracing::info!(
                "✅ {} bracket open: entry {} / stop {} / target {}",
                symbol,
                bracket.entry.order_id,
                bracket.stop_loss.order_id,
                bracket.take_profit.order_id
            );
            return;
        }
        Err(err) => err,
    };

    match &err.source {
        TradingError::OrderPlacement(failure) if failure.is_unprotected() => {
            tracing::error!(
                symbol = %err.symbol,
                phase = %err.phase,
                entry_order_id = failure.entry_order_id.as_deref().unwrap_or("?"),
                "🚨 UNPROTECTED POSITION: entry order {} is live without its exit legs, manual intervention required. {}",
                failure.entry_order_id.as_deref().unwrap_or("?"),
                failure
            );
        }
        TradingError::OrderPlacement(failure) => {
            tracing::error!(
                symbol = %err.symbol,
                phase = %err.phase,
                "❌ Bracket order failed: {}",
                failure
            );
        }
        source => {
            tracing::warn!(
                symbol = %err.symbol,
                phase = %err.phase,
                error = %source,
                "⚠️  Cycle aborted"
            );
        }
    }
}
