/// Live log viewer over HTTP.
///
/// Serves the in-memory log buffer so the bootstrap progress can be watched
/// from a browser while the application starts.
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use streamboot_shared::log_sink::LogSink;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Serialize)]
pub struct LogsResponse {
    pub capacity: usize,
    pub lines: Vec<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /
async fn rendered_log(State(sink): State<LogSink>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        sink.rendered(),
    )
}

/// GET /api/logs
async fn log_lines(State(sink): State<LogSink>) -> Json<LogsResponse> {
    Json(LogsResponse {
        capacity: sink.capacity(),
        lines: sink.snapshot(),
    })
}

/// GET /api/health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn router(sink: LogSink) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(rendered_log))
        .route("/api/logs", get(log_lines))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(sink)
}

/// Bind `addr` and serve the viewer on a background task.
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn serve(addr: SocketAddr, sink: LogSink) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!("Log viewer listening on http://{}", local);

    let app = router(sink);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Log viewer stopped: {}", e);
        }
    });
    Ok((local, handle))
}
