//! Collection cycles: build per-cloud snapshots and publish them.
//!
//! Each cycle builds every cloud's snapshot off to the side and publishes it
//! in a single store call, so scrapes keep seeing the previous complete
//! snapshot for as long as the remote calls take.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use cloudgauge_cache::{SnapshotBuilder, SnapshotStore};
use cloudgauge_core::{CloudId, ServiceSet};

use crate::error::MetricsResult;
use crate::source::{CloudEnumerator, ServiceCollector};

/// Which clouds a collector processes.
#[derive(Clone)]
pub enum CloudTarget {
    /// Always exactly this cloud; no discovery.
    Single(CloudId),
    /// Whatever the enumerator returns at the start of each cycle.
    Discover(Arc<dyn CloudEnumerator>),
}

/// Outcome of collecting one cloud.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudReport {
    pub cloud: CloudId,
    /// Services that returned successfully.
    pub collected: Vec<String>,
    /// Services that failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Enabled services this cloud does not run.
    pub skipped: Vec<String>,
    /// Families in the published snapshot.
    pub families: usize,
}

/// Outcome of one full cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub clouds: Vec<CloudReport>,
}

impl CycleSummary {
    pub fn cloud(&self, cloud: &str) -> Option<&CloudReport> {
        self.clouds.iter().find(|r| r.cloud == cloud)
    }

    pub fn failures(&self) -> usize {
        self.clouds.iter().map(|r| r.failed.len()).sum()
    }
}

/// Drives collection cycles into a snapshot store.
pub struct Collector {
    store: Arc<dyn SnapshotStore>,
    source: Arc<dyn ServiceCollector>,
    target: CloudTarget,
    services: ServiceSet,
    interval: Duration,
}

impl Collector {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        source: Arc<dyn ServiceCollector>,
        target: CloudTarget,
        services: ServiceSet,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            target,
            services,
            interval,
        }
    }

    /// Services polled for every cloud.
    pub fn services(&self) -> &ServiceSet {
        &self.services
    }

    async fn clouds(&self) -> MetricsResult<Vec<CloudId>> {
        match &self.target {
            CloudTarget::Single(cloud) => Ok(vec![cloud.clone()]),
            CloudTarget::Discover(enumerator) => {
                let mut clouds = enumerator.enumerate().await?;
                clouds.sort();
                clouds.dedup();
                Ok(clouds)
            }
        }
    }

    /// Collect every enabled service of one cloud and publish the result.
    ///
    /// A failing service is logged and left out; the snapshot is published
    /// with whatever the other services returned.
    pub async fn collect_cloud(&self, cloud: &str) -> CloudReport {
        let started = Instant::now();
        let mut builder = SnapshotBuilder::new();
        let mut report = CloudReport {
            cloud: cloud.to_string(),
            ..CloudReport::default()
        };

        for service in self.services.iter() {
            if !self.source.serves(cloud, service) {
                debug!(%cloud, %service, "service not run by this cloud");
                report.skipped.push(service.to_string());
                continue;
            }
            match self.source.collect(cloud, service).await {
                Ok(families) => {
                    let added = builder.extend(service, families);
                    debug!(%cloud, %service, families = added, "service collected");
                    report.collected.push(service.to_string());
                }
                Err(e) => {
                    warn!(%cloud, %service, error = %e, "service collection failed, skipping");
                    report.failed.push((service.to_string(), e.to_string()));
                }
            }
        }

        let published = self.store.publish(cloud, builder);
        report.families = published.len();

        info!(
            %cloud,
            families = report.families,
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cloud snapshot refreshed"
        );
        report
    }

    /// Run one cycle over every target cloud.
    ///
    /// If discovery fails nothing is collected or published and the error
    /// is returned; the snapshots already in the store stay as they are.
    pub async fn run_cycle(&self) -> MetricsResult<CycleSummary> {
        let clouds = self.clouds().await?;
        let mut summary = CycleSummary::default();
        for cloud in &clouds {
            summary.clouds.push(self.collect_cloud(cloud).await);
        }
        debug!(clouds = clouds.len(), failures = summary.failures(), "collection cycle finished");
        Ok(summary)
    }

    /// Run cycles on the configured interval until shutdown.
    ///
    /// The first cycle starts immediately. Shutdown is observed between
    /// cycles; an in-flight cycle runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            services = self.services.len(),
            "collector started"
        );

        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "collection cycle aborted");
                    }
                }
                _ = shutdown.changed() => {
                    info!("collector shutting down");
                    break;
                }
            }
        }
    }
}
