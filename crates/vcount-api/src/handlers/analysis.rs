//! Synchronous analysis and history handlers.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use vcount_models::{AnalysisReport, HistoryRecord, RecordId};
use vcount_storage::clamp_limit;

use crate::error::{ApiError, ApiResult};
use crate::handlers::form::read_analysis_form;
use crate::metrics;
use crate::state::AppState;

/// Report plus the history outcome.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub report: AnalysisReport,
    /// History record id, absent when the write failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

/// POST /upload
///
/// Runs the analysis to completion and returns the report. The run is
/// cancelled if the client disconnects.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let form = read_analysis_form(&mut multipart, &state.upload_dir).await?;
    metrics::record_upload("sync", form.size);
    info!(
        filename = %form.upload.filename(),
        bytes = form.size,
        interval_seconds = form.config.interval_seconds,
        alert_limit = form.config.alert_limit,
        "Analysis requested"
    );

    let outcome = state.executor.run_now(form.upload, form.config).await?;

    Ok(Json(UploadResponse {
        report: outcome.report,
        document_id: outcome.record_id,
        history_error: outcome.persistence_error,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /history?limit=N
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<HistoryRecord>>> {
    let records = state.history().list(Some(clamp_limit(query.limit))).await?;
    Ok(Json(records))
}

/// GET /analysis/:id
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<HistoryRecord>> {
    let record = state
        .history()
        .get(&RecordId::from_string(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Analysis not found"))?;
    Ok(Json(record))
}
