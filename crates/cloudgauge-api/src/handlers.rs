//! HTTP handlers.
//!
//! Scrape handlers render straight from the cache. JSON bodies and request
//! errors use the `ApiResponse` wrapper; a failed encode is plain text.

use std::time::UNIX_EPOCH;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use cloudgauge_cache::SnapshotStore;
use cloudgauge_core::ServiceSet;
use cloudgauge_metrics::{Format, produce_buffer_as};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn text_error(msg: &str, status: StatusCode) -> Response {
    (
        status,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{msg}\n"),
    )
        .into_response()
}

/// Render the cached snapshot of `cloud` into a response.
///
/// The format follows the request's `Accept` headers. A cold cloud is an
/// empty `200`; an encoding failure is a `500` with no metric bytes.
pub fn write_to_response<S>(
    store: &S,
    cloud: &str,
    allowed: &ServiceSet,
    headers: &HeaderMap,
) -> Response
where
    S: SnapshotStore + ?Sized,
{
    let accept = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok());
    let format = Format::negotiate(accept);

    match produce_buffer_as(store, cloud, allowed, format) {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, format.content_type())], body).into_response(),
        Err(e) => {
            error!(%cloud, error = %e, "scrape failed");
            text_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Scrapes ────────────────────────────────────────────────────

/// GET /metrics
pub async fn default_metrics(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    match &state.default_cloud {
        Some(cloud) => write_to_response(state.store.as_ref(), cloud, &state.services, &headers),
        None => error_response(
            "no default cloud configured; use /probe?cloud=<name>",
            StatusCode::NOT_FOUND,
        ),
    }
}

/// Query string of `/probe`.
#[derive(Debug, Default, Deserialize)]
pub struct ProbeParams {
    pub cloud: Option<String>,
    /// Comma-separated; narrows the enabled services.
    pub include_services: Option<String>,
    /// Comma-separated; removed after `include_services` is applied.
    pub exclude_services: Option<String>,
}

impl ProbeParams {
    /// Services this scrape may see. Never wider than `enabled`.
    pub fn allowed(&self, enabled: &ServiceSet) -> ServiceSet {
        let include = self.include_services.as_deref().map(ServiceSet::parse_list);
        let exclude = self.exclude_services.as_deref().map(ServiceSet::parse_list);
        enabled.scoped(include.as_ref(), exclude.as_ref())
    }
}

/// GET /probe
pub async fn probe_metrics(
    State(state): State<ApiState>,
    Query(params): Query<ProbeParams>,
    headers: HeaderMap,
) -> Response {
    let cloud = match params.cloud.as_deref().map(str::trim) {
        Some(cloud) if !cloud.is_empty() => cloud,
        _ => return error_response("missing cloud parameter", StatusCode::BAD_REQUEST),
    };
    let allowed = params.allowed(&state.services);
    write_to_response(state.store.as_ref(), cloud, &allowed, &headers)
}

// ── Cache inspection ───────────────────────────────────────────

/// One cached cloud as reported by `/api/v1/clouds`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CloudSummary {
    pub name: String,
    /// Unix seconds.
    pub captured_at: u64,
    pub age_seconds: f64,
    pub records: usize,
    pub services: Vec<String>,
}

/// GET /api/v1/clouds
pub async fn list_clouds(State(state): State<ApiState>) -> impl IntoResponse {
    let now = state.clock.now();
    let clouds: Vec<CloudSummary> = state
        .store
        .clouds()
        .into_iter()
        .filter_map(|name| {
            let snapshot = state.store.get(&name)?;
            Some(CloudSummary {
                captured_at: snapshot
                    .captured_at()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default(),
                age_seconds: snapshot.age(now).as_secs_f64(),
                records: snapshot.len(),
                services: snapshot.services().iter().map(str::to_string).collect(),
                name,
            })
        })
        .collect();
    ApiResponse::ok(clouds)
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
