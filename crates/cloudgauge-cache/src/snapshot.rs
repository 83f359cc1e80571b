//! Snapshot types: the private builder and the published, read-only view.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use prometheus::proto::MetricFamily;

use cloudgauge_core::{ServiceName, ServiceSet};

/// One metric family together with the service that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub service: ServiceName,
    pub family: MetricFamily,
}

impl MetricRecord {
    pub fn name(&self) -> &str {
        self.family.get_name()
    }
}

/// A snapshot under construction.
///
/// Owned by exactly one collection cycle and invisible to readers until it
/// is handed to [`SnapshotStore::publish`](crate::SnapshotStore::publish).
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    records: HashMap<String, MetricRecord>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a family owned by `service`.
    ///
    /// Families are keyed by name; a later insert under the same name
    /// replaces the earlier one, whichever service it came from. The
    /// replaced record is returned.
    pub fn insert(&mut self, service: &str, family: MetricFamily) -> Option<MetricRecord> {
        let name = family.get_name().to_string();
        self.records.insert(
            name,
            MetricRecord {
                service: service.to_string(),
                family,
            },
        )
    }

    /// Add every family from one service call. Returns how many were added.
    pub fn extend(&mut self, service: &str, families: impl IntoIterator<Item = MetricFamily>) -> usize {
        let mut added = 0;
        for family in families {
            self.insert(service, family);
            added += 1;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn seal(self, captured_at: SystemTime) -> CloudSnapshot {
        CloudSnapshot {
            captured_at,
            records: self.records,
        }
    }
}

/// The point-in-time view of one cloud, as published in the store.
///
/// There is no way to mutate a `CloudSnapshot` once built; the store only
/// ever replaces it wholesale.
#[derive(Debug, Clone)]
pub struct CloudSnapshot {
    captured_at: SystemTime,
    records: HashMap<String, MetricRecord>,
}

impl CloudSnapshot {
    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Age relative to `now`. Zero if `now` is before the capture time.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.captured_at).unwrap_or_default()
    }

    pub fn get(&self, family: &str) -> Option<&MetricRecord> {
        self.records.get(family)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &MetricRecord> {
        self.records.values()
    }

    /// The services that contributed at least one family.
    pub fn services(&self) -> ServiceSet {
        self.records.values().map(|r| r.service.clone()).collect()
    }

    /// Records owned by an allowed service, sorted by family name.
    pub fn filtered(&self, allowed: &ServiceSet) -> Vec<&MetricRecord> {
        let mut records: Vec<&MetricRecord> = self
            .records
            .values()
            .filter(|r| allowed.contains(&r.service))
            .collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::proto::{Gauge, Metric, MetricType};
    use std::time::UNIX_EPOCH;

    fn family(name: &str, value: f64) -> MetricFamily {
        let mut gauge = Gauge::default();
        gauge.set_value(value);
        let mut metric = Metric::default();
        metric.set_gauge(gauge);
        let mut mf = MetricFamily::default();
        mf.set_name(name.to_string());
        mf.set_field_type(MetricType::GAUGE);
        mf.mut_metric().push(metric);
        mf
    }

    fn value_of(record: &MetricRecord) -> f64 {
        record.family.get_metric()[0].get_gauge().get_value()
    }

    #[test]
    fn builder_tags_records_with_service() {
        let mut builder = SnapshotBuilder::new();
        builder.insert("compute", family("servers_total", 4.0));
        builder.extend("network", vec![family("ports_total", 9.0), family("routers_total", 2.0)]);
        assert_eq!(builder.len(), 3);

        let snapshot = builder.seal(UNIX_EPOCH);
        assert_eq!(snapshot.get("servers_total").unwrap().service, "compute");
        assert_eq!(snapshot.get("ports_total").unwrap().service, "network");
        let services = snapshot.services();
        assert_eq!(services.iter().collect::<Vec<_>>(), vec!["compute", "network"]);
    }

    #[test]
    fn collision_is_last_write_wins() {
        let mut builder = SnapshotBuilder::new();
        assert!(builder.insert("compute", family("shared", 1.0)).is_none());
        let replaced = builder.insert("network", family("shared", 2.0)).unwrap();
        assert_eq!(replaced.service, "compute");

        let snapshot = builder.seal(UNIX_EPOCH);
        assert_eq!(snapshot.len(), 1);
        let record = snapshot.get("shared").unwrap();
        assert_eq!(record.service, "network");
        assert_eq!(value_of(record), 2.0);
    }

    #[test]
    fn filtered_keeps_allowed_services_in_name_order() {
        let mut builder = SnapshotBuilder::new();
        builder.insert("network", family("zeta", 1.0));
        builder.insert("compute", family("beta", 1.0));
        builder.insert("compute", family("alpha", 1.0));
        let snapshot = builder.seal(UNIX_EPOCH);

        let allowed: ServiceSet = ["compute"].into_iter().collect();
        let filtered = snapshot.filtered(&allowed);
        let names: Vec<&str> = filtered.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(snapshot.filtered(&ServiceSet::new()).is_empty());
    }

    #[test]
    fn age_saturates_when_clock_is_behind() {
        let snapshot = SnapshotBuilder::new().seal(UNIX_EPOCH + Duration::from_secs(100));
        assert_eq!(snapshot.age(UNIX_EPOCH + Duration::from_secs(130)), Duration::from_secs(30));
        assert_eq!(snapshot.age(UNIX_EPOCH + Duration::from_secs(50)), Duration::ZERO);
    }
}
