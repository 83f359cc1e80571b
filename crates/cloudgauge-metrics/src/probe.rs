//! Endpoint probes: the built-in [`ServiceCollector`].
//!
//! Each configured service of each cloud is an HTTP endpoint. Collecting a
//! service means one GET against it, reported as two gauges:
//!
//! - `cloudgauge_<service>_up`: 1 for a 2xx answer, 0 for any other status
//! - `cloudgauge_<service>_probe_duration_seconds`: round-trip time
//!
//! A probe that cannot connect or times out produces no samples; the
//! collector skips the service for that cycle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use tracing::{debug, warn};

use cloudgauge_core::{CloudConfig, CloudId, ConfigResult, ExporterConfig, ServiceEndpoint};

use crate::error::{MetricsError, MetricsResult};
use crate::family::gauge;
use crate::source::{CloudEnumerator, ServiceCollector};

/// The clouds and service endpoints known to the exporter.
///
/// When built from a file, every enumeration re-reads it so clouds can be
/// added or removed without a restart. A file that no longer parses fails
/// the enumeration and the previous catalog stays in effect.
pub struct EndpointCatalog {
    path: Option<PathBuf>,
    clouds: RwLock<Arc<Vec<CloudConfig>>>,
}

impl EndpointCatalog {
    /// Fixed catalog; enumeration never changes it.
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            path: None,
            clouds: RwLock::new(Arc::new(config.clouds.clone())),
        }
    }

    /// Catalog backed by a config file. The initial load must succeed.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let config = ExporterConfig::from_file(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            clouds: RwLock::new(Arc::new(config.clouds)),
        })
    }

    /// Current clouds.
    pub fn clouds(&self) -> Arc<Vec<CloudConfig>> {
        self.clouds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn endpoint(&self, cloud: &str, service: &str) -> Option<ServiceEndpoint> {
        self.clouds()
            .iter()
            .find(|c| c.name == cloud)?
            .service(service)
            .cloned()
    }

    /// Re-read the backing file, if any.
    pub fn reload(&self) -> MetricsResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let config = ExporterConfig::from_file(path)
            .map_err(|e| MetricsError::Enumeration(format!("{}: {e}", path.display())))?;

        let clouds = Arc::new(config.clouds);
        debug!(path = %path.display(), clouds = clouds.len(), "endpoint catalog reloaded");
        *self.clouds.write().unwrap_or_else(PoisonError::into_inner) = clouds;
        Ok(())
    }
}

impl EndpointCatalog {
    fn reload_or_keep(&self) -> MetricsResult<()> {
        self.reload().inspect_err(|e| {
            warn!(error = %e, "keeping previous endpoint catalog");
        })
    }
}

#[async_trait]
impl CloudEnumerator for EndpointCatalog {
    async fn enumerate(&self) -> MetricsResult<Vec<CloudId>> {
        self.reload_or_keep()?;
        Ok(self.clouds().iter().map(|c| c.name.clone()).collect())
    }
}

/// Always exactly one cloud, but still reloads the catalog every cycle so
/// endpoint edits are picked up in single-cloud mode too.
pub struct PinnedCloud {
    catalog: Arc<EndpointCatalog>,
    cloud: CloudId,
}

impl PinnedCloud {
    pub fn new(catalog: Arc<EndpointCatalog>, cloud: impl Into<CloudId>) -> Self {
        Self {
            catalog,
            cloud: cloud.into(),
        }
    }
}

#[async_trait]
impl CloudEnumerator for PinnedCloud {
    async fn enumerate(&self) -> MetricsResult<Vec<CloudId>> {
        self.catalog.reload_or_keep()?;
        Ok(vec![self.cloud.clone()])
    }
}

/// Collects a service by probing its HTTP endpoint.
pub struct EndpointProbeCollector {
    catalog: Arc<EndpointCatalog>,
}

impl EndpointProbeCollector {
    pub fn new(catalog: Arc<EndpointCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ServiceCollector for EndpointProbeCollector {
    async fn collect(&self, cloud: &str, service: &str) -> MetricsResult<Vec<MetricFamily>> {
        let endpoint = self
            .catalog
            .endpoint(cloud, service)
            .ok_or_else(|| MetricsError::service(cloud, service, "no endpoint configured"))?;
        let timeout = endpoint
            .timeout()
            .map_err(|e| MetricsError::service(cloud, service, e.to_string()))?;

        let started = Instant::now();
        let status = http_probe(&endpoint.address, &endpoint.path, timeout)
            .await
            .map_err(|reason| MetricsError::service(cloud, service, reason))?;
        let elapsed = started.elapsed();

        let prefix = format!("cloudgauge_{}", sanitize(service));
        let labels = [("cloud", cloud)];
        let up = if status.is_success() { 1.0 } else { 0.0 };
        Ok(vec![
            gauge(
                &format!("{prefix}_up"),
                "Whether the service endpoint answered with a 2xx status.",
                &labels,
                up,
            ),
            gauge(
                &format!("{prefix}_probe_duration_seconds"),
                "Round-trip time of the endpoint probe.",
                &labels,
                elapsed.as_secs_f64(),
            ),
        ])
    }

    /// A known cloud runs only the services it lists. An unknown cloud is
    /// reported as a collection error by `collect`.
    fn serves(&self, cloud: &str, service: &str) -> bool {
        match self.catalog.clouds().iter().find(|c| c.name == cloud) {
            Some(config) => config.service(service).is_some(),
            None => true,
        }
    }
}

/// Replace characters that are not valid in a metric name.
fn sanitize(service: &str) -> String {
    service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// GET `http://{address}{path}` and return the status.
///
/// Connection failures, handshake errors and timeouts are errors; any
/// HTTP status, including 5xx, is a successful probe.
pub async fn http_probe(
    address: &str,
    path: &str,
    timeout: Duration,
) -> Result<http::StatusCode, String> {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| format!("connect {address}: {e}"))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| format!("handshake with {address}: {e}"))?;

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", concat!("cloudgauge/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| format!("building request for {uri}: {e}"))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request to {uri}: {e}"))?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), %uri, "probe non-2xx");
        }
        Ok::<_, String>(resp.status())
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(format!("probe of {uri} timed out after {timeout:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status_line` to every connection.
    async fn canned_server(status_line: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => read += n,
                        }
                    }
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        addr
    }

    /// Accept connections and never answer.
    async fn silent_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        addr
    }

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    fn catalog_for(cloud: &str, service: &str, address: SocketAddr, timeout: &str) -> EndpointCatalog {
        let toml = format!(
            r#"
[[clouds]]
name = "{cloud}"

[[clouds.services]]
name = "{service}"
address = "{address}"
path = "/healthz"
timeout = "{timeout}"
"#
        );
        EndpointCatalog::from_config(&ExporterConfig::from_toml_str(&toml).unwrap())
    }

    fn value(families: &[MetricFamily], name: &str) -> f64 {
        let family = families.iter().find(|f| f.get_name() == name).unwrap();
        family.get_metric()[0].get_gauge().get_value()
    }

    #[tokio::test]
    async fn healthy_endpoint_reports_up() {
        let addr = canned_server("200 OK").await;
        let catalog = Arc::new(catalog_for("prod", "compute", addr, "2s"));
        let collector = EndpointProbeCollector::new(catalog);

        let families = collector.collect("prod", "compute").await.unwrap();
        assert_eq!(families.len(), 2);
        assert_eq!(value(&families, "cloudgauge_compute_up"), 1.0);
        assert!(value(&families, "cloudgauge_compute_probe_duration_seconds") >= 0.0);

        let label = &families[0].get_metric()[0].get_label()[0];
        assert_eq!(label.get_name(), "cloud");
        assert_eq!(label.get_value(), "prod");
    }

    #[tokio::test]
    async fn non_2xx_reports_down() {
        let addr = canned_server("503 Service Unavailable").await;
        let catalog = Arc::new(catalog_for("prod", "block-storage", addr, "2s"));
        let collector = EndpointProbeCollector::new(catalog);

        let families = collector.collect("prod", "block-storage").await.unwrap();
        assert_eq!(value(&families, "cloudgauge_block_storage_up"), 0.0);
    }

    #[tokio::test]
    async fn connection_refused_is_a_collection_error() {
        let addr = closed_port().await;
        let catalog = Arc::new(catalog_for("prod", "compute", addr, "2s"));
        let collector = EndpointProbeCollector::new(catalog);

        let err = collector.collect("prod", "compute").await.unwrap_err();
        assert!(matches!(
            err,
            MetricsError::ServiceCollection { ref cloud, ref service, .. }
                if cloud == "prod" && service == "compute"
        ));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let addr = silent_server().await;
        let catalog = Arc::new(catalog_for("prod", "compute", addr, "100ms"));
        let collector = EndpointProbeCollector::new(catalog);

        let started = Instant::now();
        let err = collector.collect("prod", "compute").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unknown_cloud_or_service_is_an_error() {
        let addr = closed_port().await;
        let catalog = Arc::new(catalog_for("prod", "compute", addr, "2s"));
        let collector = EndpointProbeCollector::new(catalog);

        assert!(collector.collect("staging", "compute").await.is_err());
        assert!(collector.collect("prod", "dns").await.is_err());
    }

    #[tokio::test]
    async fn static_catalog_enumerates_configured_clouds() {
        let addr = closed_port().await;
        let catalog = catalog_for("prod", "compute", addr, "2s");
        assert_eq!(catalog.enumerate().await.unwrap(), vec!["prod"]);
        assert!(catalog.endpoint("prod", "compute").is_some());
    }

    const ONE_CLOUD: &str = r#"
[[clouds]]
name = "prod"

[[clouds.services]]
name = "compute"
address = "127.0.0.1:1"
"#;

    const TWO_CLOUDS: &str = r#"
[[clouds]]
name = "prod"

[[clouds.services]]
name = "compute"
address = "127.0.0.1:1"

[[clouds]]
name = "staging"
"#;

    #[tokio::test]
    async fn file_catalog_reloads_on_enumerate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudgauge.toml");
        std::fs::write(&path, ONE_CLOUD).unwrap();

        let catalog = EndpointCatalog::from_file(&path).unwrap();
        assert_eq!(catalog.enumerate().await.unwrap(), vec!["prod"]);

        std::fs::write(&path, TWO_CLOUDS).unwrap();
        assert_eq!(catalog.enumerate().await.unwrap(), vec!["prod", "staging"]);
    }

    #[tokio::test]
    async fn broken_file_fails_enumeration_and_keeps_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudgauge.toml");
        std::fs::write(&path, TWO_CLOUDS).unwrap();
        let catalog = EndpointCatalog::from_file(&path).unwrap();

        std::fs::write(&path, "clouds = 12").unwrap();
        let err = catalog.enumerate().await.unwrap_err();
        assert!(matches!(err, MetricsError::Enumeration(_)));
        assert_eq!(catalog.clouds().len(), 2);
        assert!(catalog.endpoint("prod", "compute").is_some());
    }

    #[tokio::test]
    async fn oversized_duration_in_reload_fails_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudgauge.toml");
        std::fs::write(&path, ONE_CLOUD).unwrap();
        let catalog = EndpointCatalog::from_file(&path).unwrap();

        let edited = format!("{ONE_CLOUD}timeout = \"5124095576030432h\"\n");
        std::fs::write(&path, edited).unwrap();
        let err = catalog.enumerate().await.unwrap_err();
        assert!(matches!(err, MetricsError::Enumeration(_)));
        assert!(err.to_string().contains("5124095576030432h"));
        assert!(catalog.endpoint("prod", "compute").is_some());
    }

    #[tokio::test]
    async fn pinned_cloud_reloads_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudgauge.toml");
        std::fs::write(&path, ONE_CLOUD).unwrap();
        let catalog = Arc::new(EndpointCatalog::from_file(&path).unwrap());
        let pinned = PinnedCloud::new(catalog.clone(), "prod");

        let moved = ONE_CLOUD.replace("127.0.0.1:1", "127.0.0.1:2");
        std::fs::write(&path, moved).unwrap();
        assert_eq!(pinned.enumerate().await.unwrap(), vec!["prod"]);
        assert_eq!(catalog.endpoint("prod", "compute").unwrap().address, "127.0.0.1:2");

        std::fs::write(&path, "clouds = 12").unwrap();
        assert!(matches!(
            pinned.enumerate().await.unwrap_err(),
            MetricsError::Enumeration(_)
        ));
    }

    #[tokio::test]
    async fn clouds_serve_only_listed_services() {
        let addr = closed_port().await;
        let catalog = Arc::new(catalog_for("prod", "compute", addr, "2s"));
        let collector = EndpointProbeCollector::new(catalog);

        assert!(collector.serves("prod", "compute"));
        assert!(!collector.serves("prod", "dns"));
        // Unknown clouds are left to `collect`, which fails them.
        assert!(collector.serves("staging", "compute"));
    }

    #[test]
    fn missing_file_fails_initial_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EndpointCatalog::from_file(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn sanitize_metric_names() {
        assert_eq!(sanitize("block-storage"), "block_storage");
        assert_eq!(sanitize("compute"), "compute");
        assert_eq!(sanitize("dns.v2"), "dns_v2");
    }
}
