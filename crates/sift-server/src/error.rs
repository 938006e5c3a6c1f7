use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use sift_core::error::{AppError, ErrorCategory};

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

fn category_status(category: ErrorCategory) -> (StatusCode, &'static str) {
    match category {
        ErrorCategory::QuotaExceeded | ErrorCategory::PoolExhausted => {
            (StatusCode::TOO_MANY_REQUESTS, category.as_str())
        }
        ErrorCategory::TransientUpstream | ErrorCategory::Cancelled => {
            (StatusCode::SERVICE_UNAVAILABLE, category.as_str())
        }
        ErrorCategory::MalformedOutput | ErrorCategory::UpstreamRejected => {
            (StatusCode::BAD_GATEWAY, category.as_str())
        }
        ErrorCategory::InvalidInput => (StatusCode::BAD_REQUEST, category.as_str()),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Failed { category, .. } => category_status(*category),
            AppError::PoolExhausted(_) => (StatusCode::TOO_MANY_REQUESTS, "pool_exhausted"),
            AppError::LlmError { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
