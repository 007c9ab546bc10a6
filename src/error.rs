use std::panic::Location;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

/// The §7 error taxonomy. Each variant carries the short reason string
/// that is surfaced to the caller verbatim.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientDataranges(String),

    #[error("{0}")]
    RangeNotFullyCovered(String),

    #[error("upstream transient error: {0}")]
    UpstreamTransient(String),

    #[error("upstream permanent error: {0}")]
    UpstreamPermanent(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Wraps an object-store failure as transient -- the caller's retry
    /// or cleanup path treats it the same as a network blip.
    pub fn from_anyhow_transient(err: anyhow::Error) -> AppError {
        AppError::UpstreamTransient(err.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            // Domain-specific aggregate-coverage failures map to 400s.
            AppError::InsufficientDataranges(_) => StatusCode::BAD_REQUEST,
            AppError::RangeNotFullyCovered(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamTransient(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UpstreamPermanent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IntegrityViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log_err(&self);
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Logs an error with its caller location and a captured span trace.
#[track_caller]
pub fn log_err(err: &dyn std::error::Error) {
    let location = Location::caller();
    let span_trace = tracing_error::SpanTrace::capture();
    error!(
        target: "datas3t",
        %location,
        error = %err,
        "span trace:\n{span_trace}"
    );
}
