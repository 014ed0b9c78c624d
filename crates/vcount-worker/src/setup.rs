//! Production component wiring.

use std::sync::Arc;

use tracing::info;
use vcount_media::{check_ffmpeg, check_ffprobe, FfmpegSampler, YoloDetector};
use vcount_storage::{FileHistoryStore, HistoryStore, MemoryHistoryStore};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::{AnalysisOrchestrator, PipelineSettings};
use crate::summary::{GeminiConfig, GeminiSummarizer, Summarizer};

/// Open the history store named by the configuration.
pub async fn open_history(config: &WorkerConfig) -> PipelineResult<Arc<dyn HistoryStore>> {
    match &config.history_path {
        Some(path) => {
            let store = FileHistoryStore::open(path)
                .await
                .map_err(|e| PipelineError::internal(format!("Failed to open history file: {}", e)))?;
            Ok(Arc::new(store))
        }
        None => {
            info!("HISTORY_PATH not set, history is kept in memory");
            Ok(Arc::new(MemoryHistoryStore::new()))
        }
    }
}

/// Gemini summarizer when `GEMINI_API_KEY` is set.
pub fn summarizer_from_env() -> PipelineResult<Option<Arc<dyn Summarizer>>> {
    let Some(gemini) = GeminiConfig::from_env() else {
        info!("GEMINI_API_KEY not set, interval summaries disabled");
        return Ok(None);
    };
    let summarizer = GeminiSummarizer::new(gemini).map_err(|e| PipelineError::internal(e.to_string()))?;
    Ok(Some(Arc::new(summarizer)))
}

/// Build an orchestrator over FFmpeg, YOLOv8 and the configured stores.
pub async fn build_orchestrator(
    config: &WorkerConfig,
    history: Arc<dyn HistoryStore>,
    summarizer: Option<Arc<dyn Summarizer>>,
) -> PipelineResult<AnalysisOrchestrator> {
    check_ffmpeg()?;
    check_ffprobe()?;

    let yolo = config.yolo_config();
    let detector = tokio::task::spawn_blocking(move || YoloDetector::new(yolo))
        .await
        .map_err(|e| PipelineError::internal(format!("Detector load task failed: {}", e)))??;

    Ok(AnalysisOrchestrator::new(
        Arc::new(FfmpegSampler::new(config.max_frame_width)),
        Arc::new(detector),
        summarizer,
        history,
        PipelineSettings::from(config),
    ))
}
