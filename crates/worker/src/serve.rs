//! Local HTTP API for running jobs without the platform queue.
//!
//! Mirrors the platform's synchronous run endpoint so that clients can be
//! tested against a worker on a developer machine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderName, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_core::job::JobOutput;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ApiConfig;
use crate::handler::{handle_job, HandlerContext};

type AppState = Arc<HandlerContext>;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Body of `POST /runsync`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Optional caller-chosen job id; a UUID is generated otherwise.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Terminal state reported for a synchronous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Response of `POST /runsync`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock handler time in milliseconds.
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn run_sync(State(ctx): State<AppState>, Json(request): Json<RunRequest>) -> Json<RunResponse> {
    let id = request
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let started = Instant::now();
    let output = handle_job(&ctx, &id, request.input).await;
    let execution_time_ms = started.elapsed().as_millis() as u64;

    let response = match output {
        JobOutput::Error { error } => RunResponse {
            id,
            status: RunStatus::Failed,
            output: None,
            error: Some(error),
            execution_time_ms,
        },
        output => RunResponse {
            id,
            status: RunStatus::Completed,
            output: Some(output),
            error: None,
            execution_time_ms,
        },
    };
    Json(response)
}

/// Build the API router with its middleware stack.
pub fn router(ctx: AppState, config: &ApiConfig) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health_check))
        .route("/runsync", post(run_sync))
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(ctx)
}

/// Serve the API until `cancel` fires.
pub async fn serve(
    ctx: AppState,
    config: &ApiConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Local job API listening");

    axum::serve(listener, router(ctx, config))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("Local job API stopped");
    Ok(())
}
