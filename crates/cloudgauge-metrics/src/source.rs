//! Collaborator traits the collector drives.

use async_trait::async_trait;
use prometheus::proto::MetricFamily;

use cloudgauge_core::CloudId;

use crate::error::MetricsResult;

/// Discovers the clouds to collect in a cycle.
#[async_trait]
pub trait CloudEnumerator: Send + Sync {
    /// Return the clouds to process, or [`MetricsError::Enumeration`]
    /// to abandon the cycle.
    ///
    /// [`MetricsError::Enumeration`]: crate::MetricsError::Enumeration
    async fn enumerate(&self) -> MetricsResult<Vec<CloudId>>;
}

/// Performs the remote calls for one service of one cloud.
///
/// Per-call timeouts are the implementation's job; the collector never
/// cancels a call in flight.
#[async_trait]
pub trait ServiceCollector: Send + Sync {
    async fn collect(&self, cloud: &str, service: &str) -> MetricsResult<Vec<MetricFamily>>;

    /// Whether `cloud` runs `service` at all. Services a cloud does not run
    /// are skipped without a call and are not counted as failures.
    fn serves(&self, _cloud: &str, _service: &str) -> bool {
        true
    }
}

/// A fixed list of clouds.
#[derive(Debug, Clone, Default)]
pub struct StaticClouds(pub Vec<CloudId>);

#[async_trait]
impl CloudEnumerator for StaticClouds {
    async fn enumerate(&self) -> MetricsResult<Vec<CloudId>> {
        Ok(self.0.clone())
    }
}
