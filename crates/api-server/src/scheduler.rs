use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use trading_engine::{EngineError, TradingEngine, Trigger};

/// Run one scheduled pass and log its outcome. Never fails the ticker.
pub async fn run_scheduled_once(engine: &TradingEngine) {
    match engine.execute(Trigger::Scheduled, false).await {
        Ok(summary) => tracing::info!(
            "Scheduled run: {} ({} submitted, {} skipped, {} failed)",
            summary.message,
            summary.submitted,
            summary.skipped,
            summary.failed
        ),
        Err(EngineError::RunInProgress(key)) => {
            tracing::info!("Scheduled run skipped, another run holds the lease for {}", key)
        }
        Err(e) => tracing::error!("Scheduled run failed: {}", e),
    }
}

/// Spawn the interval trigger. The first run fires one full `period` after
/// start; ticks missed while a run is in flight are skipped, not replayed.
pub fn spawn_scheduler(
    engine: Arc<TradingEngine>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tracing::info!("Interval scheduler every {}s", period.as_secs());

    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => run_scheduled_once(&engine).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }
    })
}
