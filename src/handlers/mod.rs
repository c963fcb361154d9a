pub mod jobs;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Observatory failures, rendered as `{"error", "status"}` JSON.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no job {0} on the board")]
    UnknownJob(u64),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownJob(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
