//! Metrics error types.

use thiserror::Error;

/// Errors raised while collecting or encoding metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Cloud discovery failed; the whole cycle is abandoned.
    #[error("cloud enumeration failed: {0}")]
    Enumeration(String),

    /// One service of one cloud could not be collected this cycle.
    #[error("collecting {service} for cloud {cloud} failed: {reason}")]
    ServiceCollection {
        cloud: String,
        service: String,
        reason: String,
    },

    /// A cached family could not be encoded; the scrape fails.
    #[error("encoding metric family {family} failed: {source}")]
    Encoding {
        family: String,
        #[source]
        source: prometheus::Error,
    },
}

impl MetricsError {
    pub fn service(cloud: &str, service: &str, reason: impl Into<String>) -> Self {
        Self::ServiceCollection {
            cloud: cloud.to_string(),
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}

pub type MetricsResult<T> = Result<T, MetricsError>;
