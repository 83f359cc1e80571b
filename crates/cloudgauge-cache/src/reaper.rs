//! TTL reaper. Evicts snapshots that stopped being refreshed.
//!
//! A cloud whose collection keeps failing at the enumeration step, or that
//! vanished from discovery, would otherwise keep serving its last snapshot
//! forever. The reaper bounds that staleness.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use cloudgauge_core::CloudId;

use crate::store::SnapshotStore;

/// Periodically evicts snapshots older than a fixed TTL.
pub struct Reaper {
    store: Arc<dyn SnapshotStore>,
    ttl: Duration,
    interval: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn SnapshotStore>, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            ttl,
            interval,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Run one sweep now.
    pub fn evict(&self) -> Vec<CloudId> {
        let evicted = self.store.evict_older_than(self.ttl);
        if !evicted.is_empty() {
            info!(count = evicted.len(), clouds = ?evicted, "evicted stale snapshots");
        }
        evicted
    }

    /// Sweep on every tick until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            ttl_secs = self.ttl.as_secs(),
            interval_secs = self.interval.as_secs(),
            "snapshot reaper started"
        );

        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evict();
                }
                _ = shutdown.changed() => {
                    debug!("snapshot reaper shutting down");
                    break;
                }
            }
        }
    }
}
