//! cloudgauge-cache — the in-memory snapshot cache behind every scrape.
//!
//! Holds the latest [`CloudSnapshot`] per cloud. Collectors fill a private
//! [`SnapshotBuilder`] and hand it to [`SnapshotStore::publish`], which swaps
//! it in atomically; readers get an `Arc` to whichever complete snapshot is
//! visible at that instant.
//!
//! # Architecture
//!
//! ```text
//! Collector ── SnapshotBuilder ──► publish() ─┐
//!                                             ▼
//!                         MemoryStore: RwLock<HashMap<cloud, Arc<CloudSnapshot>>>
//!                                             ▲            ▲
//! Scrape handler ─────────────── get() ───────┘            │
//! Reaper ─────────────────────── evict_older_than() ───────┘
//! ```
//!
//! Lock hold time is a single map lookup, insert or key scan. Remote
//! collection never runs under the lock.

pub mod clock;
pub mod reaper;
pub mod snapshot;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use reaper::Reaper;
pub use snapshot::{CloudSnapshot, MetricRecord, SnapshotBuilder};
pub use store::{MemoryStore, SnapshotStore};
