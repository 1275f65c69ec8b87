//! HTTP surface over the matching core.
//!
//! Routes (each also mounted under the legacy `/api/...` path):
//! - `GET  /match-fragments?text=&target_lang=&brand_id=`
//! - `POST /glossary/bulk-sync`
//! - `POST /leverage-analysis`
//! - `POST /translation-memory`
//! - `GET  /health`, `GET /metrics`

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{MatchError, RepositoryError};
use crate::matching::{GlossaryPair, HintComposer, LeverageStats};
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::repository::NewTmEntry;

pub struct AppState {
    pub composer: HintComposer,
    pub metrics: Arc<MetricsRegistry>,
}

/// Error body is always `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Match(MatchError),
}

impl From<MatchError> for ApiError {
    fn from(e: MatchError) -> Self {
        ApiError::Match(e)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        ApiError::Match(MatchError::RepositoryUnavailable(e))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Match(e) => {
                let status = match &e {
                    MatchError::InvalidScope(_) => StatusCode::BAD_REQUEST,
                    MatchError::RepositoryUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    MatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                };
                if status.is_server_error() {
                    warn!(error = %e, status = status.as_u16(), "request failed");
                }
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct MatchQuery {
    #[serde(default)]
    text: String,
    target_lang: Option<String>,
    brand_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MatchResponse {
    matches: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisRequest {
    text: String,
    target_lang: String,
    brand_id: String,
}

#[derive(Debug, Serialize)]
struct AnalysisResponse {
    matches: BTreeMap<String, String>,
    leverage: LeverageStats,
}

#[derive(Debug, Serialize)]
struct BulkSyncResponse {
    status: &'static str,
    terms_indexed: usize,
}

async fn match_fragments(
    State(state): State<Arc<AppState>>,
    Query(q): Query<MatchQuery>,
) -> Result<Json<MatchResponse>, ApiError> {
    let hints = state
        .composer
        .compose(
            &q.text,
            q.target_lang.as_deref().unwrap_or_default(),
            q.brand_id.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(MatchResponse {
        matches: hints.hint_strings(),
    }))
}

async fn bulk_sync(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<GlossaryPair>>, JsonRejection>,
) -> Result<Json<BulkSyncResponse>, ApiError> {
    let Json(pairs) = payload?;
    let report = state.composer.ingest_glossary(pairs).await?;
    Ok(Json(BulkSyncResponse {
        status: "success",
        terms_indexed: report.processed,
    }))
}

async fn leverage_analysis(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(req) = payload?;
    let analysis = state
        .composer
        .analyze(&req.text, &req.target_lang, &req.brand_id)
        .await?;
    Ok(Json(AnalysisResponse {
        matches: analysis.hints.hint_strings(),
        leverage: analysis.leverage,
    }))
}

async fn create_tm_entry(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewTmEntry>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(entry) = payload?;
    let id = state.composer.ingest_tm(entry).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let glossary = state.composer.glossary().clone();
    let terms = tokio::task::spawn_blocking(move || glossary.len())
        .await
        .map_err(|e| RepositoryError::Unavailable(e.to_string()))??;
    Ok(Json(json!({ "status": "ok", "glossary_terms": terms })))
}

async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/match-fragments", get(match_fragments))
        .route("/api/translation-memory/match-fragments", get(match_fragments))
        .route("/glossary/bulk-sync", post(bulk_sync))
        .route("/api/glossary/bulk-sync", post(bulk_sync))
        .route("/leverage-analysis", post(leverage_analysis))
        .route("/api/leverage-analysis", post(leverage_analysis))
        .route("/translation-memory", post(create_tm_entry))
        .route("/api/translation-memory", post(create_tm_entry))
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
