//! Alert Scheduler
//!
//! Runs alert passes on a fixed interval. A pass is awaited before the
//! next tick is taken, and ticks missed during a slow pass are skipped.

use std::sync::Arc;
use std::time::Duration;

use market_alerts::AlertManager;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct JobScheduler {
    manager: Arc<AlertManager>,
    interval: Duration,
}

impl JobScheduler {
    pub fn new(manager: Arc<AlertManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Start the loop. It exits once `shutdown` flips to `true`.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval_secs = self.interval.as_secs(), "Alert scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.manager.check_alerts().await {
                            tracing::error!(error = %e, "Alert pass failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Alert scheduler stopped");
        })
    }
}
