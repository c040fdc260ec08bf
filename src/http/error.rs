//! Mapping of [`Error`] to HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::Error;

/// Error returned by handlers. Rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

/// Result type for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// HTTP status for an error.
#[must_use]
pub const fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::OperationFailed { .. } | Error::FeatureNotEnabled(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::InvalidInput(rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self(Error::InvalidInput(err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }
        metrics::counter!("http_errors_total", "status" => status.as_str().to_string())
            .increment(1);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST ; "invalid input")]
    #[test_case(Error::entry_not_found("x"), StatusCode::NOT_FOUND ; "not found")]
    #[test_case(Error::Conflict("x".into()), StatusCode::CONFLICT ; "conflict")]
    #[test_case(Error::failed("op", "boom"), StatusCode::INTERNAL_SERVER_ERROR ; "failed")]
    fn test_status_mapping(err: Error, expected: StatusCode) {
        assert_eq!(status_for(&err), expected);
        assert_eq!(ApiError(err).into_response().status(), expected);
    }
}
