//! Run progress and cancellation channels.
//!
//! The orchestrator holds a `RunHandle` to publish progress and observe
//! cancellation; whoever started the run holds the matching `RunControl`.

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;
use vcount_models::{JobId, RunProgress, RunState};

/// Orchestrator side of a run.
#[derive(Debug)]
pub struct RunHandle {
    id: JobId,
    progress: watch::Sender<RunProgress>,
    cancel: watch::Receiver<bool>,
}

/// Caller side of a run.
#[derive(Debug)]
pub struct RunControl {
    progress: watch::Receiver<RunProgress>,
    cancel: watch::Sender<bool>,
}

/// Create a linked handle and control for run `id`.
pub fn run_channel(id: JobId) -> (RunHandle, RunControl) {
    let (progress_tx, progress_rx) = watch::channel(RunProgress::default());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    (
        RunHandle {
            id,
            progress: progress_tx,
            cancel: cancel_rx,
        },
        RunControl {
            progress: progress_rx,
            cancel: cancel_tx,
        },
    )
}

impl RunHandle {
    /// Handle for a run nobody observes or cancels.
    pub fn detached() -> Self {
        run_channel(JobId::new()).0
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn state(&self) -> RunState {
        self.progress.borrow().state
    }

    /// Move to `next` if the state machine allows it.
    pub fn set_state(&self, next: RunState) -> bool {
        let mut moved = false;
        self.progress.send_modify(|p| {
            if p.state.can_transition_to(next) {
                p.state = next;
                p.updated_at = Utc::now();
                moved = true;
            }
        });
        if !moved {
            debug!(run_id = %self.id, from = %self.state(), to = %next, "Ignored state transition");
        }
        moved
    }

    pub fn set_estimated_frames(&self, frames: u64) {
        self.progress.send_modify(|p| {
            p.frames_estimated = Some(frames);
            p.updated_at = Utc::now();
        });
    }

    pub fn set_frames_processed(&self, frames: u64) {
        self.progress.send_modify(|p| {
            p.frames_processed = frames;
            p.updated_at = Utc::now();
        });
    }

    pub fn set_summaries_done(&self, summaries: u32) {
        self.progress.send_modify(|p| {
            p.summaries_done = summaries;
            p.updated_at = Utc::now();
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Receiver that resolves cancellation in `wait_cancelled`.
    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }
}

impl RunControl {
    /// Ask the run to stop. Has no effect once it reached a terminal state.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Latest published progress.
    pub fn progress(&self) -> RunProgress {
        self.progress.borrow().clone()
    }
}

/// Resolve once cancellation is requested; never resolves if the control
/// side is dropped without cancelling.
pub async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_state_transitions_follow_lifecycle() {
        let (handle, control) = run_channel(JobId::new());
        assert!(handle.set_state(RunState::Sampling));
        assert!(!handle.set_state(RunState::Completed));
        assert_eq!(control.progress().state, RunState::Sampling);

        assert!(handle.set_state(RunState::Failed));
        assert!(!handle.set_state(RunState::Cancelled));
        assert_eq!(control.progress().state, RunState::Failed);
    }

    #[test]
    fn test_progress_published() {
        let (handle, control) = run_channel(JobId::new());
        handle.set_estimated_frames(120);
        handle.set_frames_processed(30);
        let progress = control.progress();
        assert_eq!(progress.frames_estimated, Some(120));
        assert_eq!(progress.frames_processed, 30);
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let (handle, control) = run_channel(JobId::new());
        let mut rx = handle.cancel_receiver();

        let waiter = tokio::spawn(async move { wait_cancelled(&mut rx).await });
        control.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_control_never_cancels() {
        let (handle, control) = run_channel(JobId::new());
        drop(control);
        let mut rx = handle.cancel_receiver();
        let result = tokio::time::timeout(Duration::from_millis(50), wait_cancelled(&mut rx)).await;
        assert!(result.is_err());
    }
}
