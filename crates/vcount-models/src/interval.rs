//! Interval aggregates and alert records.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aggregated detections for one fixed-length window of the video.
///
/// `objects_detected` holds the mean per-frame count of each label over the
/// frames sampled in the window, so values are fractional. A `BTreeMap` keeps
/// serialization order stable between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Interval {
    /// Ordinal position, starting at 0
    pub index: u32,
    /// Start offset in seconds
    pub timestamp: f64,
    /// Window length in seconds (the last window may be shorter)
    pub duration: f64,
    /// Mean per-frame count by label
    pub objects_detected: BTreeMap<String, f64>,
    /// Sum of `objects_detected` values
    pub total_count: f64,
    /// Whether `total_count` exceeded the alert limit
    pub alert: bool,
    /// Natural-language summary, absent when not generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    /// Frames successfully run through the detector
    #[serde(default)]
    pub frames_sampled: u32,
    /// Frames whose detection failed and were skipped
    #[serde(default)]
    pub frames_failed: u32,
}

impl Interval {
    /// Create an empty interval.
    pub fn empty(index: u32, timestamp: f64, duration: f64) -> Self {
        Self {
            index,
            timestamp,
            duration,
            objects_detected: BTreeMap::new(),
            total_count: 0.0,
            alert: false,
            ai_summary: None,
            frames_sampled: 0,
            frames_failed: 0,
        }
    }
}

/// Threshold breach raised for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Alert {
    /// Start offset of the offending interval in seconds
    pub timestamp: f64,
    /// Human-readable description
    pub message: String,
    /// Interval total count that triggered the alert
    #[serde(default)]
    pub count: f64,
    /// Threshold in effect for the run
    #[serde(default)]
    pub limit: u32,
}

impl Alert {
    /// Build the alert for an interval that exceeded `limit`.
    pub fn for_interval(interval: &Interval, limit: u32) -> Self {
        Self {
            timestamp: interval.timestamp,
            message: format!(
                "Object count {} exceeds threshold {} at interval {}",
                format_count_above(interval.total_count, limit),
                limit,
                interval.index
            ),
            count: interval.total_count,
            limit,
        }
    }
}

/// Render a count at presentation precision (at most two decimals).
pub fn format_count(value: f64) -> String {
    trim_decimals(&format!("{:.2}", value))
}

/// Render `value` with as many decimals as it takes to read above `limit`.
///
/// Only called for breaching intervals, so `value > limit`; the shortest
/// round-trip form is the last resort.
fn format_count_above(value: f64, limit: u32) -> String {
    let limit = f64::from(limit);
    for precision in 2..=9 {
        let text = format!("{:.*}", precision, value);
        if text.parse::<f64>().is_ok_and(|shown| shown > limit) {
            return trim_decimals(&text);
        }
    }
    value.to_string()
}

fn trim_decimals(text: &str) -> String {
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(7.0), "7");
        assert_eq!(format_count(7.5), "7.5");
        assert_eq!(format_count(2.333333), "2.33");
        assert_eq!(format_count(0.0), "0");
        assert_eq!(format_count(10.0), "10");
    }

    #[test]
    fn test_alert_message() {
        let mut interval = Interval::empty(2, 120.0, 60.0);
        interval.total_count = 7.0;
        let alert = Alert::for_interval(&interval, 5);
        assert_eq!(alert.timestamp, 120.0);
        assert_eq!(
            alert.message,
            "Object count 7 exceeds threshold 5 at interval 2"
        );
        assert_eq!(alert.limit, 5);
    }

    #[test]
    fn test_alert_count_never_reads_as_the_limit() {
        let mut interval = Interval::empty(0, 0.0, 60.0);
        interval.total_count = 5.004;
        let alert = Alert::for_interval(&interval, 5);
        assert_eq!(
            alert.message,
            "Object count 5.004 exceeds threshold 5 at interval 0"
        );

        interval.total_count = 5.0 + 1e-12;
        let alert = Alert::for_interval(&interval, 5);
        assert!(!alert.message.starts_with("Object count 5 "));

        interval.total_count = 5.5;
        let alert = Alert::for_interval(&interval, 5);
        assert!(alert.message.starts_with("Object count 5.5 exceeds"));
    }

    #[test]
    fn test_summary_omitted_when_absent() {
        let interval = Interval::empty(0, 0.0, 10.0);
        let json = serde_json::to_value(&interval).unwrap();
        assert!(json.get("ai_summary").is_none());
        assert_eq!(json["objects_detected"], serde_json::json!({}));
    }
}
