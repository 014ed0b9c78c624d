//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use vcount_storage::HistoryStore;
use vcount_worker::setup::{build_orchestrator, open_history, summarizer_from_env};
use vcount_worker::{AnalysisExecutor, PipelineResult, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub executor: Arc<AnalysisExecutor>,
    /// Directory uploaded videos are staged in
    pub upload_dir: PathBuf,
}

impl AppState {
    /// Create the state with production components.
    pub async fn new(config: ApiConfig, worker: &WorkerConfig) -> PipelineResult<Self> {
        let history = open_history(worker).await?;
        let summarizer = summarizer_from_env()?;
        let orchestrator = build_orchestrator(worker, history, summarizer).await?;
        let executor = AnalysisExecutor::new(Arc::new(orchestrator), worker);

        Ok(Self::with_components(
            config,
            Arc::new(executor),
            worker.upload_dir.clone(),
        ))
    }

    /// Assemble the state from already-built components.
    pub fn with_components(
        config: ApiConfig,
        executor: Arc<AnalysisExecutor>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            executor,
            upload_dir: upload_dir.into(),
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        self.executor.orchestrator().history()
    }
}
