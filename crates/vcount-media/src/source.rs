//! Uploaded video handles.
//!
//! A `VideoUpload` is the raw file accepted from a caller; once probed it
//! becomes a `VideoSource` owned by exactly one analysis run. Uploaded bytes
//! live in a temporary file that is deleted when the handle is dropped, so a
//! run that ends for any reason releases its media.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;

/// Accepted container extensions.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Longest filename kept after sanitizing.
const MAX_FILENAME_LENGTH: usize = 128;

/// Backing file of a video handle.
#[derive(Debug)]
pub enum SourceFile {
    /// Deleted on drop
    Temporary(TempPath),
    /// Caller-owned file, left in place
    Persistent(PathBuf),
}

impl SourceFile {
    pub fn path(&self) -> &Path {
        match self {
            SourceFile::Temporary(p) => p,
            SourceFile::Persistent(p) => p,
        }
    }
}

/// A video accepted for analysis but not yet probed.
#[derive(Debug)]
pub struct VideoUpload {
    file: SourceFile,
    filename: String,
}

impl VideoUpload {
    /// Start a temporary upload file inside `dir`, to be filled chunk by chunk.
    ///
    /// The filename is sanitized and its extension checked before anything is
    /// created. Dropping the writer before [`UploadWriter::finish`] removes the
    /// partial file.
    pub async fn create(dir: impl AsRef<Path>, filename: &str) -> MediaResult<UploadWriter> {
        let filename = sanitize_filename(filename);
        let extension = check_extension(&filename)?;
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let temp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(dir)?;
        let path = temp.into_temp_path();
        let file = tokio::fs::File::create(&path).await?;

        Ok(UploadWriter {
            upload: Self {
                file: SourceFile::Temporary(path),
                filename,
            },
            file,
            written: 0,
        })
    }

    /// Wrap an existing file without taking ownership of it.
    pub fn from_path(path: impl Into<PathBuf>) -> MediaResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path));
        }
        let filename = path
            .file_name()
            .map(|n| sanitize_filename(&n.to_string_lossy()))
            .unwrap_or_else(|| "video".to_string());
        check_extension(&filename)?;

        Ok(Self {
            file: SourceFile::Persistent(path),
            filename,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// Upload being streamed to disk.
#[derive(Debug)]
pub struct UploadWriter {
    upload: VideoUpload,
    file: tokio::fs::File,
    written: u64,
}

impl UploadWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> MediaResult<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush the file and hand back the finished upload.
    pub async fn finish(mut self) -> MediaResult<VideoUpload> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        debug!(
            filename = %self.upload.filename,
            bytes = self.written,
            path = %self.upload.path().display(),
            "Stored upload"
        );
        Ok(self.upload)
    }
}

/// Probed video, exclusively owned by one analysis run.
#[derive(Debug)]
pub struct VideoSource {
    file: SourceFile,
    filename: String,
    info: VideoInfo,
}

impl VideoSource {
    /// Attach probe results to an upload.
    pub fn new(upload: VideoUpload, info: VideoInfo) -> Self {
        Self {
            file: upload.file,
            filename: upload.filename,
            info,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.info.duration
    }

    /// Frame rate, when known.
    pub fn fps(&self) -> Option<f64> {
        self.info.fps
    }
}

/// Reduce a client-supplied filename to a safe basename.
///
/// Keeps ASCII alphanumerics, dots, dashes and underscores; everything else
/// becomes an underscore. Leading dots are stripped so the result can never
/// name a hidden file or a parent directory.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LENGTH)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

/// Whether the filename carries one of the accepted extensions.
pub fn is_allowed_file(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

fn check_extension(filename: &str) -> MediaResult<String> {
    match extension_of(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(MediaError::UnsupportedFormat(format!(
            "'{}' is not one of: {}",
            filename,
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\my clip.mp4"), "my_clip.mp4");
        assert_eq!(sanitize_filename(".hidden.mov"), "hidden.mov");
        assert_eq!(sanitize_filename(""), "video");
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(is_allowed_file("a.mp4"));
        assert!(is_allowed_file("a.MKV"));
        assert!(!is_allowed_file("a.gif"));
        assert!(!is_allowed_file("noext"));
    }

    #[tokio::test]
    async fn test_upload_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = VideoUpload::create(dir.path(), "street cam.mp4").await.unwrap();
        writer.write_chunk(b"not really video").await.unwrap();
        let upload = writer.finish().await.unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(upload.filename(), "street_cam.mp4");

        let source = VideoSource::new(
            upload,
            VideoInfo {
                duration: 1.0,
                width: 2,
                height: 2,
                fps: Some(1.0),
                frame_count: Some(1),
                codec: "h264".into(),
            },
        );
        assert_eq!(source.path(), path.as_path());
        drop(source);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_upload_written_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = VideoUpload::create(dir.path(), "clip.mkv").await.unwrap();
        for chunk in [&b"abc"[..], b"", b"defg"] {
            writer.write_chunk(chunk).await.unwrap();
        }
        assert_eq!(writer.written(), 7);

        let upload = writer.finish().await.unwrap();
        assert_eq!(tokio::fs::read(upload.path()).await.unwrap(), b"abcdefg");
    }

    #[tokio::test]
    async fn test_abandoned_upload_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = VideoUpload::create(dir.path(), "clip.mp4").await.unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        drop(writer);

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = VideoUpload::create(dir.path(), "notes.txt").await.unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedFormat(_)));
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
