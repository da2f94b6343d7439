use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("malformed polyline: {0}")]
    MalformedPolyline(String),

    #[error("route unavailable: {0}")]
    RouteUnavailable(String),

    #[error("geocoding unavailable: {0}")]
    GeocodeUnavailable(String),

    #[error("no session identity present")]
    IdentityMissing,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("otp does not match")]
    OtpMismatch,

    #[error("too many otp attempts for match {0}")]
    OtpLocked(String),

    #[error("store conflict: {0}")]
    StoreConflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Recoverable errors the caller may retry as-is (or after a re-read).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RouteUnavailable(_) | AppError::OtpMismatch | AppError::StoreConflict(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::MalformedPolyline(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RouteUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::GeocodeUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::IdentityMissing => StatusCode::UNAUTHORIZED,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::OtpMismatch => StatusCode::UNAUTHORIZED,
            AppError::OtpLocked(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::StoreConflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": message,
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
