//! `serve` subcommand: wires the cache, collector, reaper and HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cloudgauge_api::ApiState;
use cloudgauge_cache::{MemoryStore, Reaper, SnapshotStore};
use cloudgauge_core::ExporterConfig;
use cloudgauge_metrics::{
    CloudTarget, Collector, EndpointCatalog, EndpointProbeCollector, PinnedCloud,
};

pub struct ServeOptions {
    pub config: PathBuf,
    pub listen: Option<String>,
    pub cloud: Option<String>,
    pub disabled_services: Vec<String>,
}

pub async fn run(opts: ServeOptions) -> anyhow::Result<()> {
    info!(config = %opts.config.display(), "cloudgauge exporter starting");

    let mut config = ExporterConfig::from_file(&opts.config)
        .with_context(|| format!("loading {}", opts.config.display()))?;
    if let Some(listen) = opts.listen {
        config.server.listen = listen;
    }
    if let Some(cloud) = opts.cloud {
        config.collection.default_cloud = Some(cloud);
    }
    config.validate()?;

    let mut services = config.enabled_services();
    for disabled in &opts.disabled_services {
        if !services.remove(disabled) {
            info!(service = %disabled, "disabled service was not enabled");
        }
    }
    let default_cloud = config.collection.default_cloud.clone();

    // ── Cache + collaborators ──────────────────────────────────

    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(EndpointCatalog::from_file(&opts.config)?);
    let prober = Arc::new(EndpointProbeCollector::new(catalog.clone()));

    // Both modes re-read the config file each cycle.
    let target = match &default_cloud {
        Some(cloud) => CloudTarget::Discover(Arc::new(PinnedCloud::new(catalog, cloud.clone()))),
        None => CloudTarget::Discover(catalog),
    };
    let collector = Collector::new(
        store.clone(),
        prober,
        target,
        services.clone(),
        config.collection.interval()?,
    );
    info!(
        services = ?services.iter().collect::<Vec<_>>(),
        default_cloud = ?default_cloud,
        "collector initialized"
    );

    let reaper = match config.collection.cache_ttl()? {
        Some(ttl) => Some(Reaper::new(
            store.clone(),
            ttl,
            config.collection.reap_interval()?,
        )),
        None => {
            info!("no cache_ttl configured, snapshots are never evicted");
            None
        }
    };

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collector_shutdown = shutdown_rx.clone();
    let collector_handle = tokio::spawn(async move {
        collector.run(collector_shutdown).await;
    });

    let reaper_handle = reaper.map(|reaper| {
        let reaper_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            reaper.run(reaper_shutdown).await;
        })
    });

    // ── HTTP API ───────────────────────────────────────────────

    let store: Arc<dyn SnapshotStore> = store;
    let state = ApiState::new(store, services).with_default_cloud(default_cloud);
    let router = cloudgauge_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(addr = %config.server.listen, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    join_task("collector", collector_handle).await;
    if let Some(handle) = reaper_handle {
        join_task("reaper", handle).await;
    }

    info!("cloudgauge exporter stopped");
    Ok(())
}

/// Wait for a background task. Returns `false` if it panicked or was
/// cancelled instead of stopping on the shutdown signal.
async fn join_task(task: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => {
            debug!(%task, "background task stopped");
            true
        }
        Err(e) if e.is_panic() => {
            error!(%task, error = %e, "background task panicked");
            false
        }
        Err(e) => {
            warn!(%task, error = %e, "background task cancelled");
            false
        }
    }
}
