//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vcount_media::MediaError;
use vcount_worker::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Analysis timed out")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vcount_storage::StorageError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Config(msg) => Self::Validation(msg),
            PipelineError::UnreadableInput(msg) => Self::Unprocessable(msg),
            PipelineError::Decode(msg) => Self::Unprocessable(msg),
            PipelineError::Timeout(_) => Self::Timeout,
            PipelineError::Cancelled => Self::Conflict("Analysis was cancelled".to_string()),
            PipelineError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::UnsupportedFormat(_) | MediaError::InvalidVideo(_) => {
                Self::Validation(e.to_string())
            }
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::BadRequest(e.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let error = match &self {
            ApiError::Internal(_) | ApiError::Storage(_) => {
                if std::env::var("ENVIRONMENT")
                    .map(|v| v.eq_ignore_ascii_case("production"))
                    .unwrap_or(false)
                {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pipeline_error_status_codes() {
        let cases = [
            (PipelineError::Config("bad".into()), StatusCode::BAD_REQUEST),
            (PipelineError::UnreadableInput("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PipelineError::Decode("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PipelineError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (PipelineError::Cancelled, StatusCode::CONFLICT),
            (PipelineError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code(), status);
        }
    }

    #[test]
    fn test_validation_message_is_bare() {
        let error = ApiError::from(PipelineError::Config(
            "interval_seconds must be between 10 and 300".into(),
        ));
        assert_eq!(error.to_string(), "interval_seconds must be between 10 and 300");
    }

    #[test]
    fn test_unsupported_format_is_client_error() {
        let error = ApiError::from(MediaError::UnsupportedFormat("gif".into()));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }
}
