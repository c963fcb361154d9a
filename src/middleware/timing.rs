use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::debug;

const RESPONSE_TIME_US: HeaderName = HeaderName::from_static("x-response-time-us");
const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// Stamps every observatory response with its handler wall time
/// (`x-response-time-us` and `server-timing`) and traces JSON calls.
/// SSE streams stay out of the log since they live for minutes.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let traced = path.starts_with("/api/") && !path.ends_with("/stream");

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros() as u64;

    let headers = response.headers_mut();
    headers.insert(RESPONSE_TIME_US, HeaderValue::from(us));
    if let Ok(val) = HeaderValue::from_str(&format!("total;dur={:.3}", us as f64 / 1000.0)) {
        headers.insert(SERVER_TIMING, val);
    }

    if traced {
        debug!(status = response.status().as_u16(), %method, %path, us, "observatory request");
    }
    response
}
