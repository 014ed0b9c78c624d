//! Interval aggregation.
//!
//! The timeline is cut into fixed-length intervals and every sampled frame is
//! folded into the interval containing its timestamp. Per-label values are
//! mean per-frame counts over the frames the detector handled; frames whose
//! detection failed are tallied separately and excluded from the mean.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use metrics::counter;
use tracing::{debug, warn};
use vcount_media::{Frame, FrameSource, MediaError, ObjectDetector};
use vcount_models::{DetectedObject, Interval};

use crate::error::{PipelineError, PipelineResult};

/// Floating point slack when deciding whether a trailing interval exists.
const DURATION_EPSILON: f64 = 1e-9;

/// `(start, duration)` of every interval covering `[0, video_duration)`.
///
/// The last interval is truncated to end at `video_duration`. A video
/// shorter than one interval yields exactly one interval.
pub fn plan_intervals(video_duration: f64, interval_seconds: f64) -> Vec<(f64, f64)> {
    if video_duration <= 0.0 || interval_seconds <= 0.0 {
        return Vec::new();
    }

    let mut count = (video_duration / interval_seconds).ceil() as usize;
    // 120.0000000001 / 60 should not produce a sliver third interval
    if count > 1 && video_duration - (count - 1) as f64 * interval_seconds <= DURATION_EPSILON {
        count -= 1;
    }
    let count = count.max(1);

    (0..count)
        .map(|i| {
            let start = i as f64 * interval_seconds;
            let duration = if i + 1 == count {
                video_duration - start
            } else {
                interval_seconds
            };
            (start, duration)
        })
        .collect()
}

/// What happened to one sampled frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Detected(Vec<DetectedObject>),
    Failed,
}

#[derive(Debug, Default)]
struct Tally {
    counts: BTreeMap<String, u64>,
    frames_ok: u32,
    frames_failed: u32,
}

/// Folds frame outcomes into intervals.
#[derive(Debug)]
pub struct IntervalAggregator {
    plan: Vec<(f64, f64)>,
    tallies: Vec<Tally>,
    interval_seconds: f64,
}

impl IntervalAggregator {
    pub fn new(video_duration: f64, interval_seconds: f64) -> Self {
        let plan = plan_intervals(video_duration, interval_seconds);
        let tallies = plan.iter().map(|_| Tally::default()).collect();
        Self {
            plan,
            tallies,
            interval_seconds,
        }
    }

    pub fn interval_count(&self) -> usize {
        self.plan.len()
    }

    /// Index of the interval containing `timestamp`.
    fn slot(&self, timestamp: f64) -> Option<usize> {
        let (last_start, last_duration) = *self.plan.last()?;
        if !timestamp.is_finite() || timestamp < 0.0 || timestamp >= last_start + last_duration {
            return None;
        }
        let index = (timestamp / self.interval_seconds).floor() as usize;
        Some(index.min(self.plan.len() - 1))
    }

    /// Fold one frame into its interval.
    pub fn record(&mut self, timestamp: f64, outcome: FrameOutcome) {
        let Some(slot) = self.slot(timestamp) else {
            warn!(timestamp, "Frame outside video duration, ignored");
            return;
        };
        let tally = &mut self.tallies[slot];

        match outcome {
            FrameOutcome::Detected(objects) => {
                tally.frames_ok += 1;
                for object in objects {
                    *tally.counts.entry(object.label).or_insert(0) += 1;
                }
            }
            FrameOutcome::Failed => tally.frames_failed += 1,
        }
    }

    /// Frames recorded so far, failed ones included.
    pub fn frames_recorded(&self) -> u64 {
        self.tallies
            .iter()
            .map(|t| u64::from(t.frames_ok + t.frames_failed))
            .sum()
    }

    /// Produce the intervals, in order, with means computed.
    pub fn finish(self) -> Vec<Interval> {
        self.plan
            .into_iter()
            .zip(self.tallies)
            .enumerate()
            .map(|(index, ((start, duration), tally))| {
                let mut interval = Interval::empty(index as u32, start, duration);
                interval.frames_sampled = tally.frames_ok;
                interval.frames_failed = tally.frames_failed;

                if tally.frames_ok > 0 {
                    let frames = f64::from(tally.frames_ok);
                    interval.objects_detected = tally
                        .counts
                        .into_iter()
                        .map(|(label, count)| (label, count as f64 / frames))
                        .collect();
                    interval.total_count = interval.objects_detected.values().sum();
                }

                interval
            })
            .collect()
    }
}

/// Counters from one pass over a frame source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionStats {
    pub frames_detected: u64,
    pub frames_failed: u64,
    /// Decode error that ended the source early, if any
    pub decode_error: Option<String>,
}

impl DetectionStats {
    pub fn frames_total(&self) -> u64 {
        self.frames_detected + self.frames_failed
    }
}

/// Run every frame of `source` through `detector` and fold the results.
///
/// Detection runs on the blocking pool with at most `parallel` frames in
/// flight; results are folded in frame order. A decode error stops the pass
/// but keeps the frames already folded. Zero recoverable frames is fatal.
pub async fn detect_frames<F>(
    source: Box<dyn FrameSource>,
    detector: Arc<dyn ObjectDetector>,
    parallel: usize,
    aggregator: &mut IntervalAggregator,
    mut on_frame: F,
) -> PipelineResult<DetectionStats>
where
    F: FnMut(u64) + Send,
{
    let frames = stream::unfold(source, |mut source| async move {
        source.next_frame().await.map(|item| (item, source))
    });

    let mut results = frames
        .map(|item| {
            let detector = Arc::clone(&detector);
            async move {
                match item {
                    Ok(frame) => Ok(detect_one(detector, frame).await),
                    Err(e) => Err(e),
                }
            }
        })
        .buffered(parallel.max(1))
        .boxed();

    let mut stats = DetectionStats::default();

    while let Some(result) = results.next().await {
        match result {
            Ok((timestamp, Ok(objects))) => {
                counter!("vcount_frames_detected_total").increment(1);
                stats.frames_detected += 1;
                aggregator.record(timestamp, FrameOutcome::Detected(objects));
            }
            Ok((timestamp, Err(e))) => {
                counter!("vcount_detection_failures_total").increment(1);
                debug!(timestamp, error = %e, "Detection failed, frame skipped");
                stats.frames_failed += 1;
                aggregator.record(timestamp, FrameOutcome::Failed);
            }
            Err(e) => {
                warn!(
                    frames = stats.frames_total(),
                    error = %e,
                    "Frame source failed, keeping frames already sampled"
                );
                stats.decode_error = Some(e.to_string());
                break;
            }
        }
        on_frame(stats.frames_total());
    }

    if stats.frames_total() == 0 {
        let reason = stats
            .decode_error
            .take()
            .unwrap_or_else(|| "video produced no frames".to_string());
        return Err(PipelineError::decode(format!("No frames could be decoded: {}", reason)));
    }

    Ok(stats)
}

/// Detect on the blocking pool; a panicking detector counts as a failed frame.
async fn detect_one(
    detector: Arc<dyn ObjectDetector>,
    frame: Frame,
) -> (f64, Result<Vec<DetectedObject>, MediaError>) {
    let timestamp = frame.timestamp;
    let result = tokio::task::spawn_blocking(move || detector.detect(&frame))
        .await
        .unwrap_or_else(|e| Err(MediaError::detection_failed(format!("Detector task failed: {}", e))));
    (timestamp, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use vcount_media::MediaResult;

    struct VecSource(VecDeque<MediaResult<Frame>>);

    #[async_trait]
    impl FrameSource for VecSource {
        async fn next_frame(&mut self) -> Option<MediaResult<Frame>> {
            self.0.pop_front()
        }
    }

    /// Reports one "person" per frame, fails on frames tagged with data[0] == 1.
    struct TagDetector;

    impl ObjectDetector for TagDetector {
        fn detect(&self, frame: &Frame) -> MediaResult<Vec<DetectedObject>> {
            if frame.data.first() == Some(&1) {
                return Err(MediaError::detection_failed("tagged"));
            }
            Ok(vec![DetectedObject::new("person", 0.9)])
        }

        fn name(&self) -> &str {
            "tag"
        }
    }

    fn frame(index: u64, timestamp: f64, tag: u8) -> MediaResult<Frame> {
        Ok(Frame {
            index,
            timestamp,
            width: 1,
            height: 1,
            data: vec![tag, 0, 0],
        })
    }

    fn objects(labels: &[&str]) -> FrameOutcome {
        FrameOutcome::Detected(labels.iter().map(|l| DetectedObject::new(*l, 0.9)).collect())
    }

    #[test]
    fn test_plan_truncates_last_interval() {
        assert_eq!(
            plan_intervals(125.0, 60.0),
            vec![(0.0, 60.0), (60.0, 60.0), (120.0, 5.0)]
        );
        assert_eq!(plan_intervals(120.0, 60.0).len(), 2);
        assert_eq!(plan_intervals(12.5, 60.0), vec![(0.0, 12.5)]);
        assert!(plan_intervals(0.0, 60.0).is_empty());
    }

    #[test]
    fn test_plan_durations_sum_to_video_duration() {
        for (duration, len) in [(125.0, 60.0), (3601.7, 10.0), (299.99, 300.0), (47.3, 11.0)] {
            let plan = plan_intervals(duration, len);
            let sum: f64 = plan.iter().map(|(_, d)| d).sum();
            assert!((sum - duration).abs() < 1e-6);
            for pair in plan.windows(2) {
                assert!((pair[0].0 + pair[0].1 - pair[1].0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_means_over_successful_frames() {
        let mut agg = IntervalAggregator::new(60.0, 60.0);
        agg.record(0.0, objects(&["person", "person", "car"]));
        agg.record(1.0, objects(&["person"]));
        agg.record(2.0, FrameOutcome::Failed);

        let intervals = agg.finish();
        assert_eq!(intervals.len(), 1);
        let interval = &intervals[0];
        assert_eq!(interval.objects_detected["person"], 1.5);
        assert_eq!(interval.objects_detected["car"], 0.5);
        assert_eq!(interval.total_count, 2.0);
        assert_eq!(interval.frames_sampled, 2);
        assert_eq!(interval.frames_failed, 1);
    }

    #[test]
    fn test_total_is_sum_of_labels() {
        let mut agg = IntervalAggregator::new(30.0, 10.0);
        agg.record(0.0, objects(&["person"]));
        agg.record(0.5, objects(&["dog", "dog", "cat"]));
        agg.record(0.9, objects(&[]));
        for interval in agg.finish() {
            let sum: f64 = interval.objects_detected.values().sum();
            assert_eq!(interval.total_count, sum);
        }
    }

    #[test]
    fn test_empty_interval() {
        let mut agg = IntervalAggregator::new(30.0, 10.0);
        agg.record(25.0, objects(&["car"]));
        let intervals = agg.finish();
        assert!(intervals[0].objects_detected.is_empty());
        assert_eq!(intervals[0].total_count, 0.0);
        assert_eq!(intervals[2].total_count, 1.0);
    }

    #[test]
    fn test_out_of_range_frames_ignored() {
        let mut agg = IntervalAggregator::new(20.0, 10.0);
        agg.record(20.0, objects(&["car"]));
        agg.record(-1.0, objects(&["car"]));
        agg.record(f64::NAN, objects(&["car"]));
        assert_eq!(agg.frames_recorded(), 0);
    }

    #[tokio::test]
    async fn test_detect_frames_counts_failures() {
        let source = VecSource(
            vec![frame(0, 0.0, 0), frame(1, 1.0, 1), frame(2, 2.0, 0)]
                .into_iter()
                .collect(),
        );
        let mut agg = IntervalAggregator::new(3.0, 10.0);
        let mut seen = Vec::new();
        let stats = detect_frames(Box::new(source), Arc::new(TagDetector), 2, &mut agg, |n| {
            seen.push(n)
        })
        .await
        .unwrap();

        assert_eq!(stats.frames_detected, 2);
        assert_eq!(stats.frames_failed, 1);
        assert_eq!(seen, vec![1, 2, 3]);
        let intervals = agg.finish();
        assert_eq!(intervals[0].total_count, 1.0);
    }

    #[tokio::test]
    async fn test_decode_error_keeps_earlier_frames() {
        let source = VecSource(
            vec![
                frame(0, 0.0, 0),
                Err(MediaError::decode_failed("corrupt packet", 1)),
                frame(2, 2.0, 0),
            ]
            .into_iter()
            .collect(),
        );
        let mut agg = IntervalAggregator::new(3.0, 10.0);
        let stats = detect_frames(Box::new(source), Arc::new(TagDetector), 1, &mut agg, |_| {})
            .await
            .unwrap();

        assert_eq!(stats.frames_detected, 1);
        assert!(stats.decode_error.is_some());
    }

    #[tokio::test]
    async fn test_zero_frames_is_fatal() {
        let mut agg = IntervalAggregator::new(3.0, 10.0);
        let err = detect_frames(
            Box::new(VecSource(VecDeque::new())),
            Arc::new(TagDetector),
            1,
            &mut agg,
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));

        let source = VecSource(vec![Err(MediaError::decode_failed("bad header", 0))].into());
        let err = detect_frames(Box::new(source), Arc::new(TagDetector), 1, &mut agg, |_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad header"));
    }
}
