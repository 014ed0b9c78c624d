//! Multipart analysis form.
//!
//! Fields: `video` (file), `interval_seconds` and `alert_limit` (integers,
//! defaulted when omitted or blank). The video is streamed chunk by chunk into
//! a temporary file; a rejected form drops that file before returning.

use std::path::Path;

use axum::extract::Multipart;
use vcount_media::{is_allowed_file, VideoUpload};
use vcount_models::{AnalysisConfig, DEFAULT_ALERT_LIMIT, DEFAULT_INTERVAL_SECONDS};

use crate::error::{ApiError, ApiResult};

/// Parsed and validated upload.
#[derive(Debug)]
pub struct AnalysisForm {
    pub upload: VideoUpload,
    pub config: AnalysisConfig,
    /// Size of the uploaded video in bytes
    pub size: u64,
}

/// Read the form, staging the video under `upload_dir`, then validate it.
pub async fn read_analysis_form(
    multipart: &mut Multipart,
    upload_dir: &Path,
) -> ApiResult<AnalysisForm> {
    let mut video: Option<(VideoUpload, u64)> = None;
    let mut interval_seconds = DEFAULT_INTERVAL_SECONDS;
    let mut alert_limit = DEFAULT_ALERT_LIMIT;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if filename.trim().is_empty() {
                    return Err(ApiError::bad_request("No file selected"));
                }
                if !is_allowed_file(&filename) {
                    return Err(ApiError::Validation("Invalid file type".to_string()));
                }

                let mut writer = VideoUpload::create(upload_dir, &filename).await?;
                while let Some(chunk) = field.chunk().await? {
                    writer.write_chunk(&chunk).await?;
                }
                let size = writer.written();
                video = Some((writer.finish().await?, size));
            }
            "interval_seconds" => {
                interval_seconds = parse_integer("interval_seconds", &field.text().await?)?
                    .unwrap_or(DEFAULT_INTERVAL_SECONDS);
            }
            "alert_limit" => {
                alert_limit = parse_integer("alert_limit", &field.text().await?)?
                    .unwrap_or(DEFAULT_ALERT_LIMIT);
            }
            _ => {}
        }
    }

    let (upload, size) =
        video.ok_or_else(|| ApiError::bad_request("No video file uploaded"))?;

    let config = AnalysisConfig::new(interval_seconds, alert_limit)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    Ok(AnalysisForm {
        upload,
        config,
        size,
    })
}

/// Blank means "use the default".
fn parse_integer(field: &str, value: &str) -> ApiResult<Option<u32>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|_| ApiError::Validation(format!("{} must be a non-negative integer", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("alert_limit", " 12 ").unwrap(), Some(12));
        assert_eq!(parse_integer("alert_limit", "").unwrap(), None);
        assert!(parse_integer("alert_limit", "ten").is_err());
        assert!(parse_integer("alert_limit", "-3").is_err());
    }
}
