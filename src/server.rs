use axum::{middleware as axum_mw, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::board::LiveBoard;
use crate::handlers;
use crate::middleware::timing;

/// Builds the observatory `Router`: read-only views of the live board.
pub fn create_router(board: Arc<LiveBoard>) -> Router {
    Router::new()
        .route("/api/jobs", get(handlers::jobs::list_jobs))
        .route("/api/jobs/:id", get(handlers::jobs::get_job))
        .route("/api/jobs/:id/stream", get(handlers::jobs::job_stream))
        .with_state(board)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the task is dropped or the listener fails.
pub async fn serve(addr: SocketAddr, board: Arc<LiveBoard>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("observatory listening on http://{}", listener.local_addr()?);
    info!("  jobs   → /api/jobs");
    info!("  stream → /api/jobs/:id/stream");
    axum::serve(listener, create_router(board)).await
}
