//! HTTP Server for the dashboard.
//!
//! # API Endpoints
//!
//! | Method | Path                | Description                                  |
//! |--------|---------------------|----------------------------------------------|
//! | GET    | `/health`           | Health check                                 |
//! | POST   | `/api/pipeline/run` | Run the ETL pipeline now                     |
//! | GET    | `/api/records`      | Canonical rows, filtered by query parameters |
//! | GET    | `/api/filters`      | Distinct values for every filter             |
//! | GET    | `/api/status`       | Status board for a filter                    |
//! | GET    | `/api/logs`         | SSE stream for real-time logs                |
//! | GET    | `/api/logs/recent`  | Latest log entries                           |
//!
//! Pipeline runs and reads that may trigger a run go through one lock, so
//! the canonical file has a single writer at a time.

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{LogEntry, LOG_BROADCASTER};
use super::types::{
    error_response, pipeline_error_response, FiltersResponse, RecordsResponse, RunResponse,
    StatusResponse,
};
use crate::dashboard::{load_or_build, Filter, StatusBoard};
use crate::error::{PipelineError, ServerError};
use crate::models::RecordSet;
use crate::transform::pipeline::{run_pipeline, PipelineOptions, PipelineReport};

type ApiError = (StatusCode, Json<Value>);

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    options: PipelineOptions,
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the router (separate from `start_server` so it can be embedded)
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/pipeline/run", post(run_now))
        .route("/api/records", get(records))
        .route("/api/filters", get(filters))
        .route("/api/status", get(status))
        .route("/api/logs", get(sse_logs))
        .route("/api/logs/recent", get(recent_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, options: PipelineOptions) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(options.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Instrumentos server running on http://localhost:{}", port);
    println!("   Output file: {}", options.output.display());
    println!("   POST /api/pipeline/run - Run the ETL pipeline");
    println!("   GET  /api/records      - Canonical rows");
    println!("   GET  /api/status       - Status board");
    println!("   GET  /api/logs         - SSE log stream");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "instrumentos",
        "version": env!("CARGO_PKG_VERSION"),
        "outputExists": state.options.output.exists(),
    }))
}

/// Run the pipeline now, after any run already in progress
async fn run_now(State(state): State<AppState>) -> Result<Json<RunResponse>, ApiError> {
    let _guard = state.run_lock.lock().await;
    let options = state.options.clone();

    let report: PipelineReport = blocking(move || run_pipeline(&options)).await?;
    Ok(Json(RunResponse::from(report)))
}

async fn records(
    State(state): State<AppState>,
    Query(filter): Query<Filter>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let table = load_table(&state).await?;
    Ok(Json(RecordsResponse::from(&filter.apply(&table))))
}

async fn filters(State(state): State<AppState>) -> Result<Json<FiltersResponse>, ApiError> {
    let table = load_table(&state).await?;
    Ok(Json(FiltersResponse::from(&table)))
}

async fn status(
    State(state): State<AppState>,
    Query(filter): Query<Filter>,
) -> Result<Json<StatusResponse>, ApiError> {
    let table = load_table(&state).await?;
    let board = StatusBoard::build(&filter.apply(&table));
    Ok(Json(StatusResponse { filter, board }))
}

/// Read the canonical file, building it first if absent
async fn load_table(state: &AppState) -> Result<RecordSet, ApiError> {
    let _guard = state.run_lock.lock().await;
    let options = state.options.clone();
    blocking(move || load_or_build(&options)).await
}

/// Run pipeline work off the async runtime and map failures to responses
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
        .and_then(|r| r.map_err(ServerError::from));

    result.map_err(|e| match e {
        ServerError::Pipeline(err) => {
            eprintln!("❌ Pipeline error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(pipeline_error_response(&err)))
        }
        ServerError::Internal(msg) => {
            eprintln!("❌ Internal error: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&msg)))
        }
    })
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn recent_logs() -> Json<Vec<LogEntry>> {
    Json(LOG_BROADCASTER.recent())
}
