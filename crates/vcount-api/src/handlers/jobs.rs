//! Background job handlers.
//!
//! `POST /jobs` accepts the same form as `/upload` but returns immediately;
//! clients poll `GET /jobs/:id` and may cancel with `DELETE /jobs/:id`.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;
use vcount_models::JobId;
use vcount_worker::{CancelOutcome, JobSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::handlers::form::read_analysis_form;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub status: &'static str,
}

/// POST /jobs
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let form = read_analysis_form(&mut multipart, &state.upload_dir).await?;
    metrics::record_upload("job", form.size);

    let job_id = state.executor.submit(form.upload, form.config).await?;
    metrics::record_job_submitted();

    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// GET /jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job_id = parse_job_id(id)?;
    state
        .executor
        .status(&job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

/// DELETE /jobs/:id
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<CancelResponse>)> {
    let job_id = parse_job_id(id)?;

    match state.executor.cancel(&job_id).await {
        CancelOutcome::Requested => {
            info!(job_id = %job_id, "Job cancel requested via API");
            metrics::record_job_cancelled();
            Ok((
                StatusCode::ACCEPTED,
                Json(CancelResponse {
                    job_id,
                    status: "cancelling",
                }),
            ))
        }
        CancelOutcome::AlreadyFinished(state) => {
            Err(ApiError::Conflict(format!("Job already {}", state)))
        }
        CancelOutcome::NotFound => Err(ApiError::not_found("Job not found")),
    }
}

/// Job ids are UUIDs; anything else cannot exist.
fn parse_job_id(id: String) -> ApiResult<JobId> {
    if id.len() > 64 || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ApiError::bad_request("Invalid job id"));
    }
    Ok(JobId::from_string(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id() {
        assert!(parse_job_id("550e8400-e29b-41d4-a716-446655440000".into()).is_ok());
        assert!(parse_job_id("../etc/passwd".into()).is_err());
        assert!(parse_job_id("x".repeat(65)).is_err());
    }
}
