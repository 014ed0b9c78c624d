//! Analysis orchestrator.
//!
//! Drives one video through `Pending → Sampling → Aggregating → Summarizing
//! → Completed`. Any unrecoverable error moves the run to `Failed`; a cancel
//! request moves it to `Cancelled`. Only completed runs reach the history
//! store, and a failed history write is reported next to the report rather
//! than failing the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use tracing::Instrument;
use vcount_media::{FrameSampler, ObjectDetector, SamplingPolicy, VideoSource, VideoUpload};
use vcount_models::{AnalysisConfig, AnalysisReport, HistoryRecord, RecordId, RunState};
use vcount_storage::HistoryStore;

use crate::aggregator::{detect_frames, IntervalAggregator};
use crate::alerts::evaluate_all;
use crate::config::WorkerConfig;
use crate::control::{wait_cancelled, RunHandle};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::summary::{summarize_all, Summarizer};

/// Per-run execution limits.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub sampling: SamplingPolicy,
    pub max_detection_parallel: usize,
    pub max_summary_parallel: usize,
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for PipelineSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            sampling: config.sampling_policy(),
            max_detection_parallel: config.max_detection_parallel,
            max_summary_parallel: config.max_summary_parallel,
            run_timeout: config.run_timeout,
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: AnalysisReport,
    /// History record id, absent when the history write failed
    pub record_id: Option<RecordId>,
    /// History write failure, reported alongside the report
    pub persistence_error: Option<String>,
}

/// Runs the analysis pipeline over injected components.
pub struct AnalysisOrchestrator {
    sampler: Arc<dyn FrameSampler>,
    detector: Arc<dyn ObjectDetector>,
    summarizer: Option<Arc<dyn Summarizer>>,
    history: Arc<dyn HistoryStore>,
    settings: PipelineSettings,
}

impl AnalysisOrchestrator {
    pub fn new(
        sampler: Arc<dyn FrameSampler>,
        detector: Arc<dyn ObjectDetector>,
        summarizer: Option<Arc<dyn Summarizer>>,
        history: Arc<dyn HistoryStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            sampler,
            detector,
            summarizer,
            history,
            settings,
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Analyze one upload end to end.
    ///
    /// The configuration is checked before anything else happens; an invalid
    /// one fails the run without touching the video or the history store.
    pub async fn run(
        &self,
        upload: VideoUpload,
        config: AnalysisConfig,
        handle: &RunHandle,
    ) -> PipelineResult<RunOutcome> {
        let logger = RunLogger::new(handle.id(), upload.filename());

        if let Err(e) = config.check() {
            handle.set_state(RunState::Failed);
            logger.log_warning(&format!("Rejected configuration: {}", e));
            counter!("vcount_runs_failed_total", "kind" => "config").increment(1);
            return Err(e.into());
        }

        let span = logger.create_span();
        self.run_checked(upload, config, handle, &logger)
            .instrument(span)
            .await
    }

    async fn run_checked(
        &self,
        upload: VideoUpload,
        config: AnalysisConfig,
        handle: &RunHandle,
        logger: &RunLogger,
    ) -> PipelineResult<RunOutcome> {
        logger.log_start(&format!(
            "interval={}s alert_limit={}",
            config.interval_seconds, config.alert_limit
        ));
        counter!("vcount_runs_started_total").increment(1);
        let started = Instant::now();

        let mut cancel = handle.cancel_receiver();
        let work = self.execute(upload, &config, handle, logger);
        let bounded = async {
            match self.settings.run_timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or(Err(PipelineError::Timeout(limit))),
                None => work.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancel) => Err(PipelineError::Cancelled),
            result = bounded => result,
        };

        // A cancel that lands after the work finished still wins over persisting
        let result = match result {
            Ok(_) if handle.is_cancelled() => Err(PipelineError::Cancelled),
            other => other,
        };

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                let state = match e {
                    PipelineError::Cancelled => RunState::Cancelled,
                    _ => RunState::Failed,
                };
                handle.set_state(state);
                match state {
                    RunState::Cancelled => logger.log_warning("Run cancelled"),
                    _ => logger.log_error(&e.to_string()),
                }
                counter!("vcount_runs_failed_total", "kind" => e.kind()).increment(1);
                return Err(e);
            }
        };

        let record = HistoryRecord::from_report(&report, config, Utc::now());
        let (record_id, persistence_error) = match self.history.append(record).await {
            Ok(id) => (Some(id), None),
            Err(e) => {
                logger.log_warning(&format!("History write failed: {}", e));
                counter!("vcount_history_write_failures_total").increment(1);
                (None, Some(e.to_string()))
            }
        };

        handle.set_state(RunState::Completed);
        counter!("vcount_runs_completed_total").increment(1);
        histogram!("vcount_run_duration_seconds").record(started.elapsed().as_secs_f64());
        logger.log_completion(&format!(
            "{} intervals, {} alerts, {} frames ({} skipped) in {:.1}s",
            report.total_intervals,
            report.alerts.len(),
            report.frames_sampled(),
            report.frames_failed(),
            started.elapsed().as_secs_f64()
        ));

        Ok(RunOutcome {
            report,
            record_id,
            persistence_error,
        })
    }

    /// Sampling, aggregation and summaries. Dropping this future releases the
    /// video and stops the decoder.
    async fn execute(
        &self,
        upload: VideoUpload,
        config: &AnalysisConfig,
        handle: &RunHandle,
        logger: &RunLogger,
    ) -> PipelineResult<AnalysisReport> {
        handle.set_state(RunState::Sampling);
        let info = self.sampler.probe(&upload).await?;
        let source = VideoSource::new(upload, info);
        let filename = source.filename().to_string();
        let duration = source.duration();

        let estimated = self
            .settings
            .sampling
            .estimated_frames(duration, source.fps());
        handle.set_estimated_frames(estimated);
        logger.log_progress(&format!(
            "duration={:.2}s estimated_frames={}",
            duration, estimated
        ));

        let frames = self.sampler.open(&source, self.settings.sampling).await?;

        handle.set_state(RunState::Aggregating);
        let mut aggregator = IntervalAggregator::new(duration, config.interval_secs_f64());
        let stats = detect_frames(
            frames,
            Arc::clone(&self.detector),
            self.settings.max_detection_parallel,
            &mut aggregator,
            |n| handle.set_frames_processed(n),
        )
        .await?;
        drop(source);

        if let Some(e) = &stats.decode_error {
            logger.log_warning(&format!(
                "Decoding stopped after {} frames: {}",
                stats.frames_total(),
                e
            ));
        }

        let mut intervals = aggregator.finish();
        let alerts = evaluate_all(&mut intervals, config.alert_limit);

        handle.set_state(RunState::Summarizing);
        if let Some(summarizer) = &self.summarizer {
            let done = summarize_all(
                Arc::clone(summarizer),
                &mut intervals,
                config.interval_seconds,
                self.settings.max_summary_parallel,
                |n| handle.set_summaries_done(n),
            )
            .await;
            logger.log_progress(&format!("{}/{} summaries generated", done, intervals.len()));
        }

        Ok(AnalysisReport::new(filename, duration, intervals, alerts))
    }
}
