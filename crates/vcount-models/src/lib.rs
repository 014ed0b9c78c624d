//! Shared data models for the vcount backend.
//!
//! This crate provides Serde-serializable types for:
//! - Analysis configuration and its validation rules
//! - Per-frame detections, intervals and alerts
//! - Analysis reports and history records
//! - Run identifiers, run states and progress snapshots

pub mod config;
pub mod detection;
pub mod history;
pub mod interval;
pub mod report;
pub mod run;

// Re-export common types
pub use config::{
    AnalysisConfig, ConfigError, DEFAULT_ALERT_LIMIT, DEFAULT_INTERVAL_SECONDS,
    MAX_INTERVAL_SECONDS, MIN_ALERT_LIMIT, MIN_INTERVAL_SECONDS,
};
pub use detection::DetectedObject;
pub use history::{HistoryRecord, RecordId};
pub use interval::{format_count, Alert, Interval};
pub use report::AnalysisReport;
pub use run::{JobId, RunProgress, RunState};
