use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Validation failures the engine returns to its immediate caller.
///
/// None of these are fatal: a rejected start request or fix never corrupts
/// state for other competitors or sessions, and nothing is retried
/// internally. Retry policy, if any, belongs to the transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RaceError {
    #[error("track must contain at least 2 points")]
    InvalidTrack,

    #[error("average duration must be positive")]
    InvalidDuration,

    #[error("invalid fix: {0}")]
    InvalidFix(&'static str),

    #[error("no live session is active")]
    SessionNotStarted,
}

impl RaceError {
    /// Stable code surfaced to WebSocket and HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            RaceError::InvalidTrack => "invalid_track",
            RaceError::InvalidDuration => "invalid_duration",
            RaceError::InvalidFix(_) => "invalid_fix",
            RaceError::SessionNotStarted => "session_not_started",
        }
    }
}

impl IntoResponse for RaceError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "ok": false,
            "error": self.code(),
        }));

        (StatusCode::BAD_REQUEST, body).into_response()
    }
}
