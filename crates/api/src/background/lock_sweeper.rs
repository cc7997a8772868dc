//! Scheduled expiry sweep for item locks and pending checkouts.
//!
//! Spawns a background task that runs one [`OrderSweeper`] cycle per tick
//! using `tokio::time::interval`. The first tick fires immediately.

use std::sync::Arc;
use std::time::Duration;

use bites_core::sweeper::OrderSweeper;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
///
/// A failed cycle is logged and the loop carries on with the next tick.
pub async fn run(sweeper: Arc<OrderSweeper>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Lock sweeper started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                // The cycle logs its own outcome.
                if let Err(e) = sweeper.run_cycle() {
                    tracing::error!(error = %e, "Lock sweeper: cycle failed");
                }
            }
        }
    }
}
