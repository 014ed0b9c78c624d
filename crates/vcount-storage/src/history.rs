//! History store seam.
//!
//! The store is append-only: completed runs are written once and read back
//! most-recent-first. No update or delete operations exist.

use async_trait::async_trait;
use vcount_models::{HistoryRecord, RecordId};

use crate::error::StorageResult;

/// Records returned by `list` when the caller gives no limit.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Upper bound on records returned by one `list` call.
pub const MAX_LIST_LIMIT: usize = 100;

/// Append-only store of completed analysis runs.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a record and return its id.
    async fn append(&self, record: HistoryRecord) -> StorageResult<RecordId>;

    /// Records ordered by `analysis_date`, newest first.
    ///
    /// `None` means `DEFAULT_LIST_LIMIT`; larger values are capped at
    /// `MAX_LIST_LIMIT`.
    async fn list(&self, limit: Option<usize>) -> StorageResult<Vec<HistoryRecord>>;

    /// Look up a single record.
    async fn get(&self, id: &RecordId) -> StorageResult<Option<HistoryRecord>>;

    /// Check that the store can be read.
    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Effective limit for a `list` call.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
}

/// Order records newest first and keep at most `limit`.
///
/// Records are expected in insertion order; among equal dates the later
/// insertion wins.
pub(crate) fn most_recent_first(mut records: Vec<HistoryRecord>, limit: usize) -> Vec<HistoryRecord> {
    records.reverse();
    // Stable sort keeps later insertions ahead on ties
    records.sort_by(|a, b| b.analysis_date.cmp(&a.analysis_date));
    records.truncate(limit);
    records
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use vcount_models::{AnalysisConfig, AnalysisReport};

    pub(crate) fn record(filename: &str, minutes: i64) -> HistoryRecord {
        let report = AnalysisReport::new(filename, 60.0, Vec::new(), Vec::new());
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        HistoryRecord::from_report(&report, AnalysisConfig::default(), date)
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(3)), 3);
        assert_eq!(clamp_limit(Some(1000)), 100);
    }

    #[test]
    fn test_most_recent_first() {
        let records = vec![record("a.mp4", 1), record("b.mp4", 3), record("c.mp4", 2)];
        let names: Vec<_> = most_recent_first(records, 10)
            .into_iter()
            .map(|r| r.video_filename)
            .collect();
        assert_eq!(names, ["b.mp4", "c.mp4", "a.mp4"]);
    }

    #[test]
    fn test_ties_prefer_later_insertion() {
        let records = vec![record("first.mp4", 0), record("second.mp4", 0)];
        let sorted = most_recent_first(records, 1);
        assert_eq!(sorted[0].video_filename, "second.mp4");
    }
}
