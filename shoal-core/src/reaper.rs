//! Background eviction of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::memory;
use crate::session::SessionRegistry;

/// Periodically tears down sessions idle for at least the TTL.
#[derive(Debug, Clone)]
pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    ttl: Duration,
}

impl IdleReaper {
    pub fn new(registry: Arc<SessionRegistry>, config: &SessionConfig) -> Self {
        Self {
            registry,
            interval: config.sweep_interval,
            ttl: config.idle_ttl,
        }
    }

    /// Runs one sweep and returns the number of sessions evicted.
    ///
    /// Sessions are checked and removed one at a time; no lock is held
    /// across the whole registry.
    pub async fn sweep(&self) -> usize {
        let mut evicted = 0;
        for id in self.registry.ids() {
            if self.registry.evict_if_idle(&id, self.ttl).await {
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!(evicted, remaining = self.registry.len(), "Idle sweep complete");
        } else {
            debug!(remaining = self.registry.len(), "Idle sweep found nothing to evict");
        }

        memory::release_unused();
        evicted
    }

    /// Runs sweeps every interval until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            info!(
                interval_secs = self.interval.as_secs(),
                ttl_secs = self.ttl.as_secs(),
                "Idle reaper started"
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Idle reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
        })
    }
}
