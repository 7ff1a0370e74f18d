//! JSON HTTP API.
//!
//! Exposes every engine operation over HTTP. All handlers share one
//! [`Engine`]; CPU-bound work runs on tokio's blocking pool so the async
//! workers stay responsive during a rebuild.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/search` | Ranked results plus margin |
//! | `POST` | `/reindex` | Rebuild the active corpus, optionally for a scope |
//! | `POST` | `/load` | Index an external corpus; pauses the watcher |
//! | `POST` | `/unload` | Back to the default corpus; resumes the watcher |
//! | `GET`  | `/status` | Index and watcher status |
//! | `POST` | `/duplicates` | Near-duplicate chunk pairs |
//! | `POST` | `/orphans` | Isolated chunks |
//! | `GET`  | `/coverage/{group}` | Seed-to-root coverage of a group |
//! | `GET`  | `/similarity` | Vocabulary overlap between groups |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `build_failed` (500),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{Engine, EngineStatus, ScopeOverride, SearchOptions};
use crate::error::EngineError;
use crate::index::IndexStats;
use crate::maintenance::{CoverageReport, DuplicatePair, GroupPair, OrphanChunk};
use crate::search::SearchResponse;
use crate::watcher;

/// Starts the HTTP server and, if enabled, the watcher.
///
/// Binds to `[server].bind` and runs until the process is terminated. A
/// failing initial build is logged rather than fatal; `/status` reports it.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let engine = Arc::new(Engine::new(config.clone())?);

    let initial = engine.clone();
    match tokio::task::spawn_blocking(move || initial.reindex(None)).await? {
        Ok(stats) => info!(chunks = stats.chunks, groups = stats.groups, "Initial index built"),
        Err(e) => warn!(error = %e, "Initial index build failed"),
    }

    if config.watcher.enabled {
        watcher::spawn(engine.clone(), Duration::from_millis(config.watcher.interval_ms));
    }

    let app = router(engine);

    println!("spectra listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The API routes over a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/reindex", post(handle_reindex))
        .route("/load", post(handle_load))
        .route("/unload", post(handle_unload))
        .route("/status", get(handle_status))
        .route("/duplicates", post(handle_duplicates))
        .route("/orphans", post(handle_orphans))
        .route("/coverage/{group}", get(handle_coverage))
        .route("/similarity", get(handle_similarity))
        .layer(cors)
        .with_state(engine)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Build(_) => (StatusCode::INTERNAL_SERVER_ERROR, "build_failed"),
        };
        if status.is_server_error() {
            warn!(error = %err, "Request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Run an engine call on the blocking pool.
async fn blocking<T, F>(engine: &Arc<Engine>, f: F) -> Result<Json<T>, AppError>
where
    F: FnOnce(&Engine) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = engine.clone();
    let result = tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(result?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

async fn handle_search(
    State(engine): State<Arc<Engine>>,
    Json(opts): Json<SearchOptions>,
) -> Result<Json<SearchResponse>, AppError> {
    blocking(&engine, move |e| e.search(&opts)).await
}

// ============ POST /reindex ============

#[derive(Debug, Default, Deserialize)]
struct ReindexRequest {
    #[serde(default)]
    scope: Option<ScopeOverride>,
}

async fn handle_reindex(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ReindexRequest>,
) -> Result<Json<IndexStats>, AppError> {
    blocking(&engine, move |e| e.reindex(req.scope.as_ref())).await
}

// ============ POST /load, POST /unload ============

#[derive(Debug, Deserialize)]
struct LoadRequest {
    path: PathBuf,
    #[serde(default)]
    name: Option<String>,
}

async fn handle_load(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<LoadRequest>,
) -> Result<Json<IndexStats>, AppError> {
    blocking(&engine, move |e| e.load_external(&req.path, req.name.as_deref())).await
}

async fn handle_unload(State(engine): State<Arc<Engine>>) -> Result<Json<IndexStats>, AppError> {
    blocking(&engine, |e| e.unload()).await
}

// ============ GET /status ============

async fn handle_status(State(engine): State<Arc<Engine>>) -> Json<EngineStatus> {
    Json(engine.status())
}

// ============ Maintenance ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DuplicatesRequest {
    threshold: Option<f64>,
    top_n: Option<usize>,
    exclude_shared_names: bool,
}

async fn handle_duplicates(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<DuplicatesRequest>,
) -> Result<Json<Vec<DuplicatePair>>, AppError> {
    blocking(&engine, move |e| {
        e.find_duplicates(req.threshold, req.top_n, req.exclude_shared_names)
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrphansRequest {
    threshold: Option<f64>,
    top_n: Option<usize>,
}

async fn handle_orphans(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<OrphansRequest>,
) -> Result<Json<Vec<OrphanChunk>>, AppError> {
    blocking(&engine, move |e| e.find_orphans(req.threshold, req.top_n)).await
}

async fn handle_coverage(
    State(engine): State<Arc<Engine>>,
    Path(group): Path<String>,
) -> Result<Json<CoverageReport>, AppError> {
    blocking(&engine, move |e| e.coverage(&group)).await
}

async fn handle_similarity(State(engine): State<Arc<Engine>>) -> Result<Json<Vec<GroupPair>>, AppError> {
    blocking(&engine, |e| Ok(e.group_similarity())).await
}
