//! cloudgauge-api — HTTP surface of the exporter.
//!
//! Every route reads from the snapshot cache only; nothing here triggers a
//! remote call.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Scrape the default cloud with every enabled service |
//! | GET | `/probe?cloud=&include_services=&exclude_services=` | Scrape one cloud, scoped |
//! | GET | `/api/v1/clouds` | Cached clouds with age and record counts |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use cloudgauge_cache::{Clock, SnapshotStore, SystemClock};
use cloudgauge_core::{CloudId, ServiceSet};

pub use handlers::write_to_response;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn SnapshotStore>,
    /// Services the collector polls; scrapes never see anything else.
    pub services: ServiceSet,
    /// Cloud served by `/metrics`.
    pub default_cloud: Option<CloudId>,
    pub clock: Arc<dyn Clock>,
}

impl ApiState {
    pub fn new(store: Arc<dyn SnapshotStore>, services: ServiceSet) -> Self {
        Self {
            store,
            services,
            default_cloud: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_default_cloud(mut self, cloud: Option<CloudId>) -> Self {
        self.default_cloud = cloud;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new().route("/clouds", get(handlers::list_clouds));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::default_metrics))
        .route("/probe", get(handlers::probe_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
