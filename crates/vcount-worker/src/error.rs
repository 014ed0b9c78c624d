//! Pipeline error types.

use std::time::Duration;

use thiserror::Error;
use vcount_media::MediaError;
use vcount_models::ConfigError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Fatal run errors. Per-frame detection failures and per-interval summary
/// failures are absorbed by the pipeline and never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Config(String),

    #[error("Unreadable input: {0}")]
    UnreadableInput(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Run exceeded time limit of {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller's input caused the failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_) | PipelineError::UnreadableInput(_) | PipelineError::Decode(_)
        )
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::UnreadableInput(_) => "unreadable_input",
            PipelineError::Decode(_) => "decode",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Internal(_) => "internal",
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<MediaError> for PipelineError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::DecodeFailed { message, .. } => Self::Decode(message),
            e if e.is_unreadable_input() => Self::UnreadableInput(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

pub type SummaryResult<T> = Result<T, SummaryError>;

/// Summary generation failure for a single interval.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summary request failed: {0}")]
    Request(String),

    #[error("Summary service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Summary response had no text")]
    EmptyResponse,

    #[error("Summary configuration error: {0}")]
    Config(String),
}

impl SummaryError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_classification() {
        let err: PipelineError = MediaError::InvalidVideo("no stream".into()).into();
        assert!(matches!(err, PipelineError::UnreadableInput(_)));
        assert!(err.is_client_error());

        let err: PipelineError = MediaError::FfmpegNotFound.into();
        assert!(matches!(err, PipelineError::Internal(_)));
        assert!(!err.is_client_error());

        let err: PipelineError = MediaError::decode_failed("corrupt", 0).into();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_config_error_message_passes_through() {
        let err: PipelineError = ConfigError::new("interval_seconds must be between 10 and 300").into();
        assert_eq!(err.to_string(), "Invalid configuration: interval_seconds must be between 10 and 300");
    }

    #[test]
    fn test_timeout_display() {
        let err = PipelineError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "Run exceeded time limit of 90s");
    }
}
