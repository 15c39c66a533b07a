// Registry Sweeper
// Periodically re-reads loaded businesses from the store and drops idle ones
// from the coordinator's memory

use crate::application::coordinator::QueueCoordinator;
use crate::application::shutdown::ShutdownToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Runs `resync_loaded` then `evict_idle` every `period` until shutdown
pub struct RegistrySweeper {
    coordinator: Arc<QueueCoordinator>,
    period: Duration,
}

impl RegistrySweeper {
    pub fn new(coordinator: Arc<QueueCoordinator>, period: Duration) -> Self {
        Self {
            coordinator,
            period,
        }
    }

    /// Sweep loop (background task)
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(interval_secs = self.period.as_secs(), "Registry sweeper started");

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tick.tick() => {
                    let republished = self.coordinator.resync_loaded().await;
                    let evicted = self.coordinator.evict_idle();
                    debug!(
                        republished,
                        evicted,
                        loaded = self.coordinator.loaded_businesses().len(),
                        "Registry sweep finished"
                    );
                }
            }
        }

        info!("Registry sweeper stopped");
    }
}
