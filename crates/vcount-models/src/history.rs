//! History records of completed analyses.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::AnalysisConfig;
use crate::interval::{Alert, Interval};
use crate::report::AnalysisReport;

/// Unique identifier for a stored history record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Generate a new random record ID.
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

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable summary of one completed run, appended to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryRecord {
    pub id: RecordId,
    pub video_filename: String,
    /// Completion time, serialized as RFC 3339
    pub analysis_date: DateTime<Utc>,
    pub video_duration: f64,
    pub total_intervals: usize,
    pub alerts: Vec<Alert>,
    /// Parameters the run was executed with
    pub config: AnalysisConfig,
    /// Full interval breakdown
    #[serde(default)]
    pub intervals: Vec<Interval>,
}

impl HistoryRecord {
    /// Capture a finished report.
    pub fn from_report(
        report: &AnalysisReport,
        config: AnalysisConfig,
        analysis_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            video_filename: report.video_filename.clone(),
            analysis_date,
            video_duration: report.video_duration,
            total_intervals: report.total_intervals,
            alerts: report.alerts.clone(),
            config,
            intervals: report.intervals.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_report_copies_summary() {
        let mut interval = Interval::empty(0, 0.0, 30.0);
        interval.total_count = 12.0;
        interval.alert = true;
        let alert = Alert::for_interval(&interval, 10);
        let report = AnalysisReport::new("lobby.mp4", 30.0, vec![interval], vec![alert]);

        let record = HistoryRecord::from_report(&report, AnalysisConfig::new(30, 10).unwrap(), Utc::now());
        assert_eq!(record.video_filename, "lobby.mp4");
        assert_eq!(record.total_intervals, 1);
        assert_eq!(record.alerts.len(), 1);
        assert_eq!(record.config.alert_limit, 10);
    }

    #[test]
    fn test_analysis_date_is_rfc3339() {
        let report = AnalysisReport::new("a.mp4", 10.0, Vec::new(), Vec::new());
        let date = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = HistoryRecord::from_report(&report, AnalysisConfig::default(), date);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["analysis_date"], "2024-05-01T12:00:00Z");
    }
}
