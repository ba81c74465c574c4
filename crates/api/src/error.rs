//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use booking::BookingError;
use common::ParseError;
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Malformed identifier in the request.
    #[error(transparent)]
    BadRequest(#[from] ParseError),

    /// Saga orchestration error.
    #[error(transparent)]
    Saga(#[from] SagaError),

    /// A booking service could not answer.
    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Saga(err) => saga_status(err),
            ApiError::Booking(err) => booking_status(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::AlreadySubmitted(_) => StatusCode::CONFLICT,
        SagaError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::InvalidTransition { .. }
        | SagaError::BranchAlreadySettled { .. }
        | SagaError::PhaseNotSettled { .. }
        | SagaError::OutcomeMismatch { .. }
        | SagaError::TaskAborted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::TransientFault { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::AlreadyCancelled { .. } => StatusCode::CONFLICT,
        BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
    }
}
