//! Video analysis pipeline.
//!
//! This crate provides:
//! - Interval aggregation over sampled frame detections
//! - Alert evaluation and Gemini interval summaries
//! - The run orchestrator with progress, cancellation and timeouts
//! - A bounded executor for synchronous and background runs

pub mod aggregator;
pub mod alerts;
pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod setup;
pub mod summary;

pub use aggregator::{plan_intervals, DetectionStats, IntervalAggregator};
pub use config::WorkerConfig;
pub use control::{run_channel, RunControl, RunHandle};
pub use error::{PipelineError, PipelineResult, SummaryError, SummaryResult};
pub use executor::{AnalysisExecutor, CancelOutcome, JobSnapshot};
pub use logging::RunLogger;
pub use orchestrator::{AnalysisOrchestrator, PipelineSettings, RunOutcome};
pub use summary::{GeminiConfig, GeminiSummarizer, Summarizer};
