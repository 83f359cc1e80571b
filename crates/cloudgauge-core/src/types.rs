//! Shared types used across cloudgauge crates.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of a monitored cloud, as used for cache keys and the `cloud` label.
pub type CloudId = String;

/// Name of a service inside a cloud (e.g. `compute`, `network`).
pub type ServiceName = String;

/// An ordered set of service names.
///
/// Used both for the services a collector polls and for the subset a
/// scrape is allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceSet(BTreeSet<ServiceName>);

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `compute, network`.
    ///
    /// Blank items are ignored, so an empty string yields an empty set.
    pub fn parse_list(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn insert(&mut self, service: impl Into<ServiceName>) -> bool {
        self.0.insert(service.into())
    }

    pub fn remove(&mut self, service: &str) -> bool {
        self.0.remove(service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.0.contains(service)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Narrow this set for a single scrape.
    ///
    /// `include` keeps only the named services (intersection with `self`);
    /// `exclude` then removes services. Absent filters leave the set as is.
    pub fn scoped(&self, include: Option<&ServiceSet>, exclude: Option<&ServiceSet>) -> ServiceSet {
        self.0
            .iter()
            .filter(|s| include.is_none_or(|inc| inc.contains(s)))
            .filter(|s| exclude.is_none_or(|exc| !exc.contains(s)))
            .cloned()
            .collect()
    }
}

impl<S: Into<ServiceName>> FromIterator<S> for ServiceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a ServiceSet {
    type Item = &'a ServiceName;
    type IntoIter = std::collections::btree_set::Iter<'a, ServiceName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parse a duration string like "500ms", "5s", "2m", "1h".
///
/// A bare number is read as seconds. Values that overflow a `u64` count of
/// seconds are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.trim().parse::<u64>().ok()?;
        mins.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours = hours.trim().parse::<u64>().ok()?;
        hours.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
