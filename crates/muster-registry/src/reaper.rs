//! Expiry reaper - background task that drops expired in-memory leases
//!
//! Reads already ignore expired records; the reaper only bounds memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::memory::MemoryRegistryStore;

pub struct ExpiryReaper {
    store: Arc<MemoryRegistryStore>,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(store: Arc<MemoryRegistryStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Expiry reaper started with interval: {}s",
            self.interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.store.purge_expired();
                    if removed > 0 {
                        debug!(removed, remaining = self.store.len(), "Purged expired registry leases");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Expiry reaper stopped");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
