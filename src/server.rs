//! HTTP API for submitting ingestion runs and polling them.
//!
//! The server shares one [`ProgressTracker`] between the handlers that
//! start runs and the handlers that report on them, so a client can
//! `POST /ingest` and then poll `GET /status/{name}` while reads against
//! the database keep working next to the in-flight run.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST`   | `/ingest` | Submit a file already on disk: `{"path": "...", "name": "..."}` |
//! | `GET`    | `/status/{name}` | Run status (processing, completed, error, unknown) |
//! | `GET`    | `/files` | Registered files, newest first |
//! | `GET`    | `/logs` | Filtered, paginated log rows |
//! | `DELETE` | `/files/{name}` | Delete a file and its rows |
//! | `GET`    | `/stats` | Summary statistics |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "path does not exist: /tmp/a.log" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use logsift_core::models::FileMetadata;
use logsift_core::naming;
use logsift_core::store::LogStore;
use logsift_core::tracker::ProgressTracker;

use crate::config::Config;
use crate::db;
use crate::ingest::{ExecutionMode, IngestionCoordinator};
use crate::query::{self, LogFilter, LogPage};
use crate::sqlite_store::SqliteStore;
use crate::stats::{self, Summary};
use crate::status::{StatusQuery, StatusResponse};

/// How often finished runs past their retention window are dropped.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    coordinator: IngestionCoordinator,
    status: StatusQuery,
}

impl AppState {
    /// Wire a coordinator and status query around one tracker and one store.
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let store: Arc<dyn LogStore> = Arc::new(SqliteStore::new(pool.clone()));
        let tracker = ProgressTracker::new(config.ingest.retention());
        let coordinator =
            IngestionCoordinator::new(store.clone(), tracker.clone(), (&config.ingest).into());
        let status = StatusQuery::new(tracker, store);
        Self {
            pool,
            coordinator,
            status,
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        self.coordinator.tracker()
    }
}

/// Build the router with all routes and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/status/{name}", get(handle_status))
        .route("/files", get(handle_list_files))
        .route("/files/{name}", delete(handle_delete_file))
        .route("/logs", get(handle_logs))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated, or returns an error if binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    serve(listener, config).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener, config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState::new(pool, config);
    spawn_eviction(state.tracker().clone());

    info!(addr = %listener.local_addr()?, "logsift server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn spawn_eviction(tracker: ProgressTracker) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            match tracker.evict_expired() {
                Ok(0) => {}
                Ok(n) => info!(evicted = n, "dropped expired runs"),
                Err(e) => warn!(error = %e, "run eviction failed"),
            }
        }
    });
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

/// Error type that converts into a JSON HTTP response.
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

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        warn!(error = %format!("{:#}", err), "request failed");
        internal(format!("{:#}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
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

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    path: PathBuf,
    /// Logical name; defaults to the path's file name.
    name: Option<String>,
}

#[derive(Serialize)]
struct IngestResponse {
    file_name: String,
}

/// Accepts a file that is already on disk and starts a background run.
///
/// Responds `202` with the registered name as soon as the run is
/// registered; progress is then available from `GET /status/{name}`.
async fn handle_ingest(
    State(state): State<AppState>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let Json(req) = body?;
    let is_file = tokio::fs::metadata(&req.path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(bad_request(format!(
            "path does not exist or is not a file: {}",
            req.path.display()
        )));
    }

    let requested = match req.name.as_deref() {
        Some(n) => n.to_string(),
        None => req
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    naming::sanitize_name(&requested).map_err(|e| bad_request(e.to_string()))?;

    let file_name = state
        .coordinator
        .submit(req.path, &requested, ExecutionMode::Background)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { file_name })))
}

// ============ GET /status/{name} ============

async fn handle_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<StatusResponse> {
    Json(state.status.status(&name).await)
}

// ============ Read-side queries ============

#[derive(Serialize)]
struct FilesResponse {
    files: Vec<FileMetadata>,
}

async fn handle_list_files(
    State(state): State<AppState>,
) -> Result<Json<FilesResponse>, AppError> {
    let files = query::list_files(&state.pool).await?;
    Ok(Json(FilesResponse { files }))
}

async fn handle_logs(
    State(state): State<AppState>,
    filter: Result<Query<LogFilter>, QueryRejection>,
) -> Result<Json<LogPage>, AppError> {
    let Query(filter) = filter?;
    Ok(Json(query::query_logs(&state.pool, &filter).await?))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: String,
}

async fn handle_delete_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    if !query::delete_file(&state.pool, &name).await? {
        return Err(not_found(format!("no file registered with name: {}", name)));
    }
    info!(file_name = %name, "file deleted");
    Ok(Json(DeleteResponse { deleted: name }))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<Summary>, AppError> {
    Ok(Json(stats::summary(&state.pool).await?))
}
