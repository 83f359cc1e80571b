//! cloudgauge.toml configuration parser.
//!
//! Durations are kept as strings in the file model (`"30s"`, `"5m"`) and
//! converted through the accessor methods, which report the offending field
//! on failure.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{parse_duration, ServiceSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub clouds: Vec<CloudConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Time between collection cycles.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Maximum snapshot age before eviction. No reaper runs when unset.
    pub cache_ttl: Option<String>,
    #[serde(default = "default_reap_interval")]
    pub reap_interval: String,
    /// Services to poll. Empty means every service named by any cloud.
    #[serde(default)]
    pub services: Vec<String>,
    /// Cloud served by `/metrics` and polled in single-cloud mode.
    pub default_cloud: Option<String>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            cache_ttl: None,
            reap_interval: default_reap_interval(),
            services: Vec::new(),
            default_cloud: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub name: String,
    #[serde(default)]
    pub services: Vec<ServiceEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    /// `host:port` of the service API.
    pub address: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

fn default_listen() -> String {
    "0.0.0.0:9180".to_string()
}

fn default_interval() -> String {
    "60s".to_string()
}

fn default_reap_interval() -> String {
    "30s".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_timeout() -> String {
    "2s".to_string()
}

fn duration_field(field: &str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
    })
}

impl ExporterConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: ExporterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.clouds.is_empty() {
            return Err(ConfigError::Invalid("no clouds configured".to_string()));
        }

        let mut seen = HashSet::new();
        for cloud in &self.clouds {
            if cloud.name.trim().is_empty() {
                return Err(ConfigError::Invalid("cloud with empty name".to_string()));
            }
            if !seen.insert(cloud.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate cloud: {}",
                    cloud.name
                )));
            }

            let mut services = HashSet::new();
            for svc in &cloud.services {
                if svc.name.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "cloud {} has a service with an empty name",
                        cloud.name
                    )));
                }
                if !services.insert(svc.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "cloud {} lists service {} twice",
                        cloud.name, svc.name
                    )));
                }
                svc.timeout()?;
            }
        }

        if let Some(default) = &self.collection.default_cloud {
            if self.cloud(default).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "default_cloud {default} is not a configured cloud"
                )));
            }
        }

        if self.collection.interval()?.is_zero() {
            return Err(ConfigError::Invalid(
                "collection interval must be non-zero".to_string(),
            ));
        }
        self.collection.cache_ttl()?;
        if self.collection.reap_interval()?.is_zero() {
            return Err(ConfigError::Invalid(
                "reap interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cloud(&self, name: &str) -> Option<&CloudConfig> {
        self.clouds.iter().find(|c| c.name == name)
    }

    pub fn cloud_names(&self) -> Vec<String> {
        self.clouds.iter().map(|c| c.name.clone()).collect()
    }

    /// The services the collector should poll.
    ///
    /// The explicit `collection.services` list wins; otherwise the union of
    /// every service named by any cloud.
    pub fn enabled_services(&self) -> ServiceSet {
        if !self.collection.services.is_empty() {
            return self.collection.services.iter().cloned().collect();
        }
        self.clouds
            .iter()
            .flat_map(|c| c.services.iter().map(|s| s.name.clone()))
            .collect()
    }
}

impl CollectionConfig {
    pub fn interval(&self) -> ConfigResult<Duration> {
        duration_field("collection.interval", &self.interval)
    }

    pub fn cache_ttl(&self) -> ConfigResult<Option<Duration>> {
        self.cache_ttl
            .as_deref()
            .map(|ttl| duration_field("collection.cache_ttl", ttl))
            .transpose()
    }

    pub fn reap_interval(&self) -> ConfigResult<Duration> {
        duration_field("collection.reap_interval", &self.reap_interval)
    }
}

impl CloudConfig {
    pub fn service(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.services.iter().find(|s| s.name == name)
    }
}

impl ServiceEndpoint {
    pub fn timeout(&self) -> ConfigResult<Duration> {
        duration_field(&format!("service {} timeout", self.name), &self.timeout)
    }
}
