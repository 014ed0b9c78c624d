//! Final analysis report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::interval::{Alert, Interval};

/// Immutable result of one completed analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisReport {
    /// Sanitized name of the uploaded file
    pub video_filename: String,
    /// Video duration in seconds
    pub video_duration: f64,
    /// Number of intervals (always `intervals.len()`)
    pub total_intervals: usize,
    /// Intervals in index order
    pub intervals: Vec<Interval>,
    /// Alerts in interval order
    pub alerts: Vec<Alert>,
}

impl AnalysisReport {
    /// Assemble a report, deriving `total_intervals` from the intervals.
    pub fn new(
        video_filename: impl Into<String>,
        video_duration: f64,
        intervals: Vec<Interval>,
        alerts: Vec<Alert>,
    ) -> Self {
        Self {
            video_filename: video_filename.into(),
            video_duration,
            total_intervals: intervals.len(),
            intervals,
            alerts,
        }
    }

    /// Total frames successfully analyzed across all intervals.
    pub fn frames_sampled(&self) -> u64 {
        self.intervals.iter().map(|i| u64::from(i.frames_sampled)).sum()
    }

    /// Total frames skipped because detection failed.
    pub fn frames_failed(&self) -> u64 {
        self.intervals.iter().map(|i| u64::from(i.frames_failed)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_intervals_derived() {
        let intervals = vec![Interval::empty(0, 0.0, 60.0), Interval::empty(1, 60.0, 5.0)];
        let report = AnalysisReport::new("clip.mp4", 65.0, intervals, Vec::new());
        assert_eq!(report.total_intervals, 2);
    }

    #[test]
    fn test_json_field_names() {
        let report = AnalysisReport::new("clip.mp4", 10.0, vec![Interval::empty(0, 0.0, 10.0)], Vec::new());
        let json = serde_json::to_value(&report).unwrap();
        for field in ["video_filename", "video_duration", "total_intervals", "intervals", "alerts"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        let interval = &json["intervals"][0];
        for field in ["timestamp", "duration", "total_count", "objects_detected", "alert"] {
            assert!(interval.get(field).is_some(), "missing interval field {}", field);
        }
    }
}
