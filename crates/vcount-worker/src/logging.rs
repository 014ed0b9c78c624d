//! Structured run logging.
//!
//! Gives every analysis run the same lifecycle log lines and a tracing span
//! carrying the run id and source filename.

use tracing::{error, info, warn, Span};
use vcount_models::JobId;

/// Logger bound to one analysis run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    filename: String,
}

impl RunLogger {
    pub fn new(run_id: &JobId, filename: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            filename: filename.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            filename = %self.filename,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            filename = %self.filename,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            filename = %self.filename,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            filename = %self.filename,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            filename = %self.filename,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Span wrapping all work done for this run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            filename = %self.filename
        )
    }
}
