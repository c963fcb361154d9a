use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::board::{JobSnapshot, LiveBoard};

use super::ApiError;

// ─── GET /api/jobs ───────────────────────────────────────────────
/// Every job the client is (or was) streaming.
pub async fn list_jobs(State(board): State<Arc<LiveBoard>>) -> Json<Vec<JobSnapshot>> {
    Json(board.snapshots())
}

// ─── GET /api/jobs/:id ───────────────────────────────────────────
/// A single JSON snapshot, handy for curl.
pub async fn get_job(
    State(board): State<Arc<LiveBoard>>,
    Path(id): Path<u64>,
) -> Result<Json<JobSnapshot>, ApiError> {
    board
        .snapshot(id)
        .map(Json)
        .ok_or_else(|| ApiError::UnknownJob(id))
}

// ─── GET /api/jobs/:id/stream ────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes the job's `JobSnapshot` as JSON every 500 ms; a chart in the
/// browser redraws from each event.
pub async fn job_stream(
    State(board): State<Arc<LiveBoard>>,
    Path(id): Path<u64>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if board.snapshot(id).is_none() {
        return Err(ApiError::UnknownJob(id));
    }

    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let event = match board.snapshot(id) {
            Some(snapshot) => {
                let json = serde_json::to_string(&snapshot).unwrap_or_default();
                Event::default().event("snapshot").data(json)
            }
            None => Event::default().event("gone").data(id.to_string()),
        };
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
