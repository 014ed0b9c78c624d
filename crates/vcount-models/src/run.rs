//! Run identifiers, lifecycle states and progress snapshots.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a background analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one analysis run.
///
/// `Pending → Sampling → Aggregating → Summarizing → Completed`, with
/// `Failed` and `Cancelled` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Accepted, waiting for a run slot
    #[default]
    Pending,
    /// Probing and decoding the video
    Sampling,
    /// Detecting and folding frames into intervals
    Aggregating,
    /// Generating interval summaries
    Summarizing,
    /// Report produced
    Completed,
    /// Unrecoverable error
    Failed,
    /// Stopped by the caller
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Sampling => "sampling",
            RunState::Aggregating => "aggregating",
            RunState::Summarizing => "summarizing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (s, Failed | Cancelled) => !s.is_terminal(),
            (Pending, Sampling) => true,
            (Sampling, Aggregating) => true,
            (Aggregating, Summarizing) => true,
            (Summarizing, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a run, published while it executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunProgress {
    pub state: RunState,
    /// Frames that went through detection (including failed ones)
    pub frames_processed: u64,
    /// Expected number of sampled frames, once the video is probed
    pub frames_estimated: Option<u64>,
    /// Summaries attempted so far
    pub summaries_done: u32,
    pub updated_at: DateTime<Utc>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            state: RunState::Pending,
            frames_processed: 0,
            frames_estimated: None,
            summaries_done: 0,
            updated_at: Utc::now(),
        }
    }
}

impl RunProgress {
    /// Progress percentage (0-100) derived from frame counts and state.
    pub fn percent(&self) -> u8 {
        match self.state {
            RunState::Completed => 100,
            RunState::Pending => 0,
            _ => match self.frames_estimated {
                Some(total) if total > 0 => {
                    // Detection covers the first 90%, summaries the rest.
                    let ratio = (self.frames_processed as f64 / total as f64).min(1.0);
                    let base = (ratio * 90.0) as u8;
                    if self.state == RunState::Summarizing {
                        base.max(90)
                    } else {
                        base
                    }
                }
                _ => 0,
            },
        }
    }
}
