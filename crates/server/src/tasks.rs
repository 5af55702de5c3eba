//! Periodic background work: stats flush and age sweep.

use std::time::Duration;

use cachet_client::Controller;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Flush pending counters every `every`.
pub fn spawn_flush(controller: Controller, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = controller.flush_stats().await {
                tracing::warn!(error = %e, "periodic stats flush failed");
            }
        }
    })
}

/// Sweep once right away, then every `every`. A zero interval sweeps only at startup.
pub fn spawn_sweep(controller: Controller, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        sweep_once(&controller).await;
        if every.is_zero() {
            return;
        }
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&controller).await;
        }
    })
}

async fn sweep_once(controller: &Controller) {
    match controller.sweep_expired().await {
        Ok(removed) => tracing::debug!(removed, "age sweep finished"),
        Err(e) => tracing::warn!(error = %e, "age sweep failed"),
    }
}
