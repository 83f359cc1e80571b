//! cloudgauge-metrics — collection and exposition for cached cloud metrics.
//!
//! Drives per-cloud collection cycles into the snapshot cache and renders
//! cached snapshots in the Prometheus exposition formats.
//!
//! # Architecture
//!
//! ```text
//! Collector
//!   ├── CloudEnumerator::enumerate()        ← which clouds this cycle
//!   ├── ServiceCollector::collect(c, s)     ← remote calls, outside any lock
//!   ├── SnapshotBuilder (private per cloud)
//!   └── SnapshotStore::publish()            → atomic swap into the cache
//!
//! Exposition
//!   ├── Format::negotiate()                 ← Accept header values
//!   └── produce_buffer()                    → filtered, sorted, encoded bytes
//!
//! Endpoint probes
//!   ├── EndpointCatalog                     ← clouds from cloudgauge.toml
//!   └── EndpointProbeCollector              → <service>_up, probe duration
//! ```

pub mod collector;
pub mod error;
pub mod exposition;
pub mod family;
pub mod probe;
pub mod source;

pub use collector::{CloudReport, CloudTarget, Collector, CycleSummary};
pub use error::{MetricsError, MetricsResult};
pub use exposition::{produce_buffer, produce_buffer_as, Format};
pub use probe::{EndpointCatalog, EndpointProbeCollector, PinnedCloud};
pub use source::{CloudEnumerator, ServiceCollector, StaticClouds};
