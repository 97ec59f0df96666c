//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use plugwatch_domain::error::{ErrorCategory, PlugwatchError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    category: ErrorCategory,
    hint: &'static str,
}

/// Maps [`PlugwatchError`] to an HTTP response with appropriate status code.
pub struct ApiError(PlugwatchError);

impl From<PlugwatchError> for ApiError {
    fn from(err: PlugwatchError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PlugwatchError::Validation(_) => StatusCode::BAD_REQUEST,
            PlugwatchError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            PlugwatchError::DeviceUnreachable { .. } => StatusCode::BAD_GATEWAY,
            PlugwatchError::CommandTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PlugwatchError::ConflictingOperation { .. } | PlugwatchError::StaleGeneration(_) => {
                StatusCode::CONFLICT
            }
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "plug command failed");
        }

        let category = self.0.category();
        let body = ErrorBody {
            error: self.0.to_string(),
            category,
            hint: category.hint(),
        };
        (status, Json(body)).into_response()
    }
}
