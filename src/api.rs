use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::{ConfigHandle, ConfigUpdate, Source};
use crate::rewrite::Rewriter;
use crate::scan::{ScanSummary, Scanner};
use crate::store::IntelStore;

const DEFAULT_INTEL_LIMIT: u32 = 50;
const MAX_INTEL_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub store: Arc<IntelStore>,
    pub scanner: Arc<Scanner>,
    pub rewriter: Arc<dyn Rewriter>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/intel", get(intel))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/scan", post(trigger_scan))
        .route("/api/generate_post", post(generate_post))
        .route("/debug/last-scan", get(debug_last_scan))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn internal_error<E: std::fmt::Display>(e: E) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

#[derive(serde::Deserialize)]
struct IntelQuery {
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(serde::Serialize)]
struct IntelOut {
    id: i64,
    source: String,
    category: String,
    title: String,
    link: String,
    summary: String,
    keyword: String,
    time: String,
}

/// Most recent records, newest first.
async fn intel(
    State(state): State<AppState>,
    Query(q): Query<IntelQuery>,
) -> Result<Json<Vec<IntelOut>>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_INTEL_LIMIT).clamp(1, MAX_INTEL_LIMIT);
    let rows = state.store.recent(limit).map_err(internal_error)?;
    let out = rows
        .into_iter()
        .map(|r| IntelOut {
            id: r.id,
            source: r.source_name,
            category: r.category,
            title: r.title,
            link: r.link,
            summary: r.summary,
            keyword: r.matched_keyword,
            time: r.timestamp,
        })
        .collect::<Vec<_>>();
    Ok(Json(out))
}

#[derive(serde::Serialize)]
struct ConfigOut {
    keywords: Vec<String>,
    sources: BTreeMap<String, Vec<Source>>,
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigOut> {
    let cfg = state.config.snapshot();
    Json(ConfigOut {
        sources: cfg.grouped_sources(),
        keywords: cfg.keywords,
    })
}

async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Json<serde_json::Value> {
    state.config.apply_update(update);
    Json(json!({ "status": "updated" }))
}

/// Kick off a scan in the background and return immediately.
async fn trigger_scan(State(state): State<AppState>) -> Json<serde_json::Value> {
    let scanner = Arc::clone(&state.scanner);
    tokio::spawn(async move {
        scanner.run_full_scan().await;
    });
    Json(json!({ "status": "scan_started" }))
}

#[derive(serde::Deserialize)]
struct GeneratePostReq {
    title: String,
    #[serde(default)]
    summary: String,
}

async fn generate_post(
    State(state): State<AppState>,
    Json(body): Json<GeneratePostReq>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let content = state
        .rewriter
        .rewrite(&body.title, &body.summary)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, provider = state.rewriter.name(), "rewrite failed");
            internal_error(e)
        })?;
    Ok(Json(json!({ "content": content })))
}

async fn debug_last_scan(State(state): State<AppState>) -> Json<Option<ScanSummary>> {
    Json(state.scanner.last_summary())
}
