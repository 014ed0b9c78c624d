//! Run executor.
//!
//! Bounds how many analyses execute at once and tracks background jobs so
//! callers can poll or cancel them. Finished jobs stay queryable for the
//! configured retention period.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::gauge;
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info, warn};
use vcount_media::VideoUpload;
use vcount_models::{AnalysisConfig, AnalysisReport, JobId, RecordId, RunState};

use crate::config::WorkerConfig;
use crate::control::{run_channel, wait_cancelled, RunControl, RunHandle};
use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::{AnalysisOrchestrator, RunOutcome};

/// How a background job ended.
#[derive(Debug, Clone)]
enum JobOutcome {
    Completed(RunOutcome),
    Failed(String),
    Cancelled,
}

#[derive(Debug)]
struct JobEntry {
    filename: String,
    control: RunControl,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<JobOutcome>,
}

/// Point-in-time view of a background job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub filename: String,
    pub state: RunState,
    pub progress: u8,
    pub frames_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_estimated: Option<u64>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Cancellation requested; the job stops at its next suspension point
    Requested,
    /// The job had already reached this terminal state
    AlreadyFinished(RunState),
    NotFound,
}

/// Executes analysis runs under a concurrency limit.
pub struct AnalysisExecutor {
    orchestrator: Arc<AnalysisOrchestrator>,
    run_semaphore: Arc<Semaphore>,
    max_concurrent_runs: usize,
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
    job_retention: Duration,
}

impl AnalysisExecutor {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>, config: &WorkerConfig) -> Self {
        let max_concurrent_runs = config.max_concurrent_runs.max(1);
        info!(max_concurrent_runs, "Analysis executor ready");

        Self {
            orchestrator,
            run_semaphore: Arc::new(Semaphore::new(max_concurrent_runs)),
            max_concurrent_runs,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            job_retention: config.job_retention,
        }
    }

    pub fn orchestrator(&self) -> &Arc<AnalysisOrchestrator> {
        &self.orchestrator
    }

    /// Runs currently holding a slot.
    pub fn active_runs(&self) -> usize {
        self.max_concurrent_runs - self.run_semaphore.available_permits()
    }

    /// Run to completion in the caller's task, waiting for a free slot first.
    ///
    /// Dropping the returned future cancels the run.
    pub async fn run_now(
        &self,
        upload: VideoUpload,
        config: AnalysisConfig,
    ) -> PipelineResult<RunOutcome> {
        // Reject bad parameters without waiting for a slot
        config.check()?;

        let permit = self
            .run_semaphore
            .acquire()
            .await
            .map_err(|_| PipelineError::internal("Run semaphore closed"))?;
        self.record_active();

        let handle = RunHandle::detached();
        let result = self.orchestrator.run(upload, config, &handle).await;
        drop(permit);
        self.record_active();
        result
    }

    /// Start a background job and return its id immediately.
    pub async fn submit(
        &self,
        upload: VideoUpload,
        config: AnalysisConfig,
    ) -> PipelineResult<JobId> {
        config.check()?;
        self.prune_finished().await;

        let job_id = JobId::new();
        let (handle, control) = run_channel(job_id.clone());

        self.jobs.write().await.insert(
            job_id.clone(),
            JobEntry {
                filename: upload.filename().to_string(),
                control,
                submitted_at: Utc::now(),
                finished_at: None,
                outcome: None,
            },
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.run_semaphore);
        let jobs = Arc::clone(&self.jobs);
        let max_concurrent_runs = self.max_concurrent_runs;
        let id = job_id.clone();

        tokio::spawn(async move {
            let mut cancel = handle.cancel_receiver();
            let acquired = tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel) => None,
                permit = Arc::clone(&semaphore).acquire_owned() => Some(permit),
            };

            let outcome = match acquired {
                Some(Ok(permit)) => {
                    gauge!("vcount_active_runs")
                        .set((max_concurrent_runs - semaphore.available_permits()) as f64);
                    let result = AssertUnwindSafe(orchestrator.run(upload, config, &handle))
                        .catch_unwind()
                        .await;
                    drop(permit);
                    match result {
                        Ok(Ok(outcome)) => JobOutcome::Completed(outcome),
                        Ok(Err(PipelineError::Cancelled)) => JobOutcome::Cancelled,
                        Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            error!(job_id = %id, panic = %message, "Analysis run panicked");
                            handle.set_state(RunState::Failed);
                            JobOutcome::Failed(format!("Analysis run panicked: {}", message))
                        }
                    }
                }
                Some(Err(_)) => {
                    handle.set_state(RunState::Failed);
                    JobOutcome::Failed("Run semaphore closed".to_string())
                }
                None => {
                    // Cancelled while queued; the upload is released here
                    handle.set_state(RunState::Cancelled);
                    JobOutcome::Cancelled
                }
            };
            gauge!("vcount_active_runs")
                .set((max_concurrent_runs - semaphore.available_permits()) as f64);

            if let Some(entry) = jobs.write().await.get_mut(&id) {
                entry.finished_at = Some(Utc::now());
                entry.outcome = Some(outcome);
            }
            debug!(job_id = %id, "Background job finished");
        });

        info!(job_id = %job_id, "Background job submitted");
        Ok(job_id)
    }

    /// Snapshot of a job, `None` when unknown or expired.
    pub async fn status(&self, job_id: &JobId) -> Option<JobSnapshot> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id)?;
        let progress = entry.control.progress();

        let mut snapshot = JobSnapshot {
            job_id: job_id.clone(),
            filename: entry.filename.clone(),
            state: progress.state,
            progress: progress.percent(),
            frames_processed: progress.frames_processed,
            frames_estimated: progress.frames_estimated,
            submitted_at: entry.submitted_at,
            finished_at: entry.finished_at,
            report: None,
            document_id: None,
            history_error: None,
            error: None,
        };

        match &entry.outcome {
            Some(JobOutcome::Completed(outcome)) => {
                snapshot.report = Some(outcome.report.clone());
                snapshot.document_id = outcome.record_id.clone();
                snapshot.history_error = outcome.persistence_error.clone();
            }
            Some(JobOutcome::Failed(error)) => snapshot.error = Some(error.clone()),
            Some(JobOutcome::Cancelled) | None => {}
        }

        Some(snapshot)
    }

    /// Request cancellation of a job.
    pub async fn cancel(&self, job_id: &JobId) -> CancelOutcome {
        let jobs = self.jobs.read().await;
        let Some(entry) = jobs.get(job_id) else {
            return CancelOutcome::NotFound;
        };

        let state = entry.control.progress().state;
        if state.is_terminal() || entry.outcome.is_some() {
            return CancelOutcome::AlreadyFinished(state);
        }

        entry.control.cancel();
        info!(job_id = %job_id, "Cancellation requested");
        CancelOutcome::Requested
    }

    /// Cancel every unfinished job and wait for running ones to stop.
    pub async fn shutdown(&self, timeout: Duration) {
        {
            let jobs = self.jobs.read().await;
            for entry in jobs.values().filter(|e| e.outcome.is_none()) {
                entry.control.cancel();
            }
        }

        info!("Waiting for in-flight runs to stop...");
        let drained = tokio::time::timeout(timeout, async {
            while self.run_semaphore.available_permits() < self.max_concurrent_runs {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(active = self.active_runs(), "Shutdown timeout with runs still active");
        }
    }

    /// Drop finished jobs older than the retention period.
    async fn prune_finished(&self) {
        let Ok(retention) = chrono::Duration::from_std(self.job_retention) else {
            return;
        };
        let cutoff = Utc::now() - retention;

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| entry.finished_at.map_or(true, |t| t > cutoff));
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!(pruned, "Pruned finished jobs");
        }
    }

    fn record_active(&self) {
        gauge!("vcount_active_runs").set(self.active_runs() as f64);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
