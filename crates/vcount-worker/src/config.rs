//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vcount_media::{SamplingPolicy, YoloConfig, DEFAULT_MAX_FRAME_WIDTH};

/// Pipeline and executor configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum analysis runs executing at once
    pub max_concurrent_runs: usize,
    /// Maximum frames in detection at once within a run
    pub max_detection_parallel: usize,
    /// Maximum summary requests in flight within a run
    pub max_summary_parallel: usize,
    /// Wall-clock cap per run, `None` for unbounded
    pub run_timeout: Option<Duration>,
    /// Seconds between sampled frames, 0 samples every frame
    pub sample_interval_secs: f64,
    /// Frames wider than this are downscaled before detection
    pub max_frame_width: u32,
    /// Directory for uploaded videos while they are analyzed
    pub upload_dir: PathBuf,
    /// JSON-lines history file, in-memory history when unset
    pub history_path: Option<PathBuf>,
    /// YOLOv8 ONNX model file
    pub model_path: PathBuf,
    /// How long finished background jobs stay queryable
    pub job_retention: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 2,
            max_detection_parallel: 4,
            max_summary_parallel: 4,
            run_timeout: Some(Duration::from_secs(3600)), // 1 hour
            sample_interval_secs: 1.0,
            max_frame_width: DEFAULT_MAX_FRAME_WIDTH,
            upload_dir: PathBuf::from("/tmp/vcount/uploads"),
            history_path: None,
            model_path: PathBuf::from("models/yolov8n.onnx"),
            job_retention: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let run_timeout_secs: u64 = env_or("RUN_TIMEOUT_SECS", 3600);

        Self {
            max_concurrent_runs: env_or("MAX_CONCURRENT_RUNS", defaults.max_concurrent_runs).max(1),
            max_detection_parallel: env_or("MAX_DETECTION_PARALLEL", defaults.max_detection_parallel)
                .max(1),
            max_summary_parallel: env_or("MAX_SUMMARY_PARALLEL", defaults.max_summary_parallel).max(1),
            run_timeout: (run_timeout_secs > 0).then(|| Duration::from_secs(run_timeout_secs)),
            sample_interval_secs: env_or("SAMPLE_INTERVAL_SECS", defaults.sample_interval_secs),
            max_frame_width: env_or("MAX_FRAME_WIDTH", defaults.max_frame_width),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            history_path: std::env::var("HISTORY_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            model_path: std::env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            job_retention: Duration::from_secs(env_or("JOB_RETENTION_SECS", 3600)),
            shutdown_timeout: Duration::from_secs(env_or("SHUTDOWN_TIMEOUT_SECS", 30)),
        }
    }

    /// Frame sampling policy for runs.
    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy::from_secs(self.sample_interval_secs)
    }

    /// Detector settings for the configured model.
    pub fn yolo_config(&self) -> YoloConfig {
        YoloConfig {
            model_path: self.model_path.clone(),
            ..Default::default()
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_runs, 2);
        assert_eq!(config.run_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.sampling_policy(), SamplingPolicy::EverySeconds(1.0));
        assert!(config.history_path.is_none());
    }

    #[test]
    fn test_zero_sample_interval_means_every_frame() {
        let config = WorkerConfig {
            sample_interval_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(config.sampling_policy(), SamplingPolicy::EveryFrame);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        assert_eq!(env_or("VCOUNT_TEST_UNSET_VARIABLE", 7usize), 7);
    }
}
