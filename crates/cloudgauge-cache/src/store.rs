//! The per-cloud snapshot store.
//!
//! `MemoryStore` is the only backend today. Callers hold an
//! `Arc<dyn SnapshotStore>` so a shared external backend could replace it
//! without touching the collector or the HTTP layer.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::debug;

use cloudgauge_core::CloudId;

use crate::clock::{Clock, SystemClock};
use crate::snapshot::{CloudSnapshot, SnapshotBuilder};

/// Storage for the latest snapshot of each cloud.
///
/// Every operation is atomic with respect to the others: a `get` sees either
/// the previous complete snapshot or the new one, never a mix.
pub trait SnapshotStore: Send + Sync {
    /// Replace the snapshot for `cloud`, stamping it with the current time.
    ///
    /// The stamp never goes backwards for a given cloud, even if the clock
    /// does. Returns the snapshot as published.
    fn publish(&self, cloud: &str, snapshot: SnapshotBuilder) -> Arc<CloudSnapshot>;

    /// The currently visible snapshot, or `None` on a cold cache.
    fn get(&self, cloud: &str) -> Option<Arc<CloudSnapshot>>;

    /// Remove every snapshot whose `captured_at + ttl` is before now.
    ///
    /// Returns the evicted clouds, sorted.
    fn evict_older_than(&self, ttl: Duration) -> Vec<CloudId>;

    /// The cached clouds, sorted.
    fn clouds(&self) -> Vec<CloudId>;
}

/// In-process snapshot store.
///
/// Constructed once at startup and shared by `Arc`. A poisoned lock is
/// recovered rather than propagated: writers only ever insert or remove a
/// whole `Arc`, so there is no half-written state to observe.
pub struct MemoryStore {
    entries: RwLock<HashMap<CloudId, Arc<CloudSnapshot>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on a custom time source.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CloudId, Arc<CloudSnapshot>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CloudId, Arc<CloudSnapshot>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemoryStore {
    fn publish(&self, cloud: &str, snapshot: SnapshotBuilder) -> Arc<CloudSnapshot> {
        let records = snapshot.len();
        let published = {
            let mut entries = self.write();
            let now = self.clock.now();
            let captured_at = match entries.get(cloud) {
                Some(prev) if prev.captured_at() > now => prev.captured_at(),
                _ => now,
            };
            let published = Arc::new(snapshot.seal(captured_at));
            entries.insert(cloud.to_string(), Arc::clone(&published));
            published
        };
        debug!(%cloud, records, "snapshot published");
        published
    }

    fn get(&self, cloud: &str) -> Option<Arc<CloudSnapshot>> {
        self.read().get(cloud).cloned()
    }

    fn evict_older_than(&self, ttl: Duration) -> Vec<CloudId> {
        let mut evicted = Vec::new();
        {
            let mut entries = self.write();
            let now = self.clock.now();
            entries.retain(|cloud, snapshot| {
                let expired = snapshot
                    .captured_at()
                    .checked_add(ttl)
                    .is_some_and(|deadline| deadline < now);
                if expired {
                    evicted.push(cloud.clone());
                }
                !expired
            });
        }
        evicted.sort();
        if !evicted.is_empty() {
            debug!(count = evicted.len(), ttl_secs = ttl.as_secs(), "stale snapshots evicted");
        }
        evicted
    }

    fn clouds(&self) -> Vec<CloudId> {
        let mut clouds: Vec<CloudId> = self.read().keys().cloned().collect();
        clouds.sort();
        clouds
    }
}
