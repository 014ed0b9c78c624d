//! JSON-lines history store.
//!
//! Each record is one line of JSON. Appends are serialized behind a mutex and
//! issued as a single `write_all` of the full line, so readers never see a
//! half-written record from this process. A failed append is rolled back to
//! the previous length; a torn trailing line that survives anyway (a crash,
//! a failed rollback) is terminated before the next record and skipped when
//! reading.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use metrics::counter;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vcount_models::{HistoryRecord, RecordId};

use crate::error::{StorageError, StorageResult};
use crate::history::{clamp_limit, most_recent_first, HistoryStore};

/// History persisted to a local JSON-lines file.
#[derive(Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileHistoryStore {
    /// Open (or create) the history file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        // Terminate a torn final line so the next append starts cleanly
        if !ends_with_newline(&mut file).await? {
            warn!(path = %path.display(), "History file ends mid-record, terminating line");
            file.write_all(b"\n").await?;
            file.sync_data().await?;
        }

        info!(path = %path.display(), "History file opened");

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every parseable record in insertion order.
    async fn read_all(&self) -> StorageResult<Vec<HistoryRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(parse_lines(&contents))
    }
}

/// Whether the file is empty or its last byte terminates a line.
async fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Parse JSON lines, skipping blanks and unreadable lines.
fn parse_lines(contents: &str) -> Vec<HistoryRecord> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<HistoryRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping unreadable history line");
                counter!("vcount_history_lines_skipped_total").increment(1);
                None
            }
        })
        .collect()
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, record: HistoryRecord) -> StorageResult<RecordId> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        let original_len = file.metadata().await?.len();
        if !ends_with_newline(&mut file).await? {
            warn!(path = %self.path.display(), "History file ends mid-record, starting a new line");
            line.insert(0, '\n');
        }

        if let Err(e) = write_line(&mut file, line.as_bytes()).await {
            if let Err(rollback) = file.set_len(original_len).await {
                warn!(error = %rollback, "Failed to roll back partial history append");
            }
            return Err(StorageError::write_failed(format!("{}: {}", self.path.display(), e)));
        }

        debug!(record_id = %record.id, path = %self.path.display(), "History record appended");
        Ok(record.id)
    }

    async fn list(&self, limit: Option<usize>) -> StorageResult<Vec<HistoryRecord>> {
        let records = self.read_all().await?;
        Ok(most_recent_first(records, clamp_limit(limit)))
    }

    async fn get(&self, id: &RecordId) -> StorageResult<Option<HistoryRecord>> {
        Ok(self.read_all().await?.into_iter().find(|r| &r.id == id))
    }

    async fn ping(&self) -> StorageResult<()> {
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::record;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_append_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");

        let store = FileHistoryStore::open(&path).await.unwrap();
        let first = store.append(record("a.mp4", 0)).await.unwrap();
        store.append(record("b.mp4", 1)).await.unwrap();
        drop(store);

        let reopened = FileHistoryStore::open(&path).await.unwrap();
        let listed = reopened.list(None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].video_filename, "b.mp4");
        assert_eq!(
            reopened.get(&first).await.unwrap().unwrap().video_filename,
            "a.mp4"
        );
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");

        let good = serde_json::to_string(&record("good.mp4", 0)).unwrap();
        tokio::fs::write(&path, format!("{}\n{{\"id\":\"tor", good))
            .await
            .unwrap();

        let store = FileHistoryStore::open(&path).await.unwrap();
        store.append(record("after.mp4", 5)).await.unwrap();

        let listed = store.list(None).await.unwrap();
        let names: Vec<_> = listed.iter().map(|r| r.video_filename.as_str()).collect();
        assert_eq!(names, ["after.mp4", "good.mp4"]);
    }

    #[tokio::test]
    async fn test_append_after_partial_write_starts_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = FileHistoryStore::open(&path).await.unwrap();
        store.append(record("first.mp4", 0)).await.unwrap();

        // Leftover of an interrupted write
        let partial = serde_json::to_string(&record("lost.mp4", 1)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(&partial.as_bytes()[..partial.len() / 2]).await.unwrap();
        drop(file);

        let next = store.append(record("next.mp4", 2)).await.unwrap();

        let listed = store.list(None).await.unwrap();
        let names: Vec<_> = listed.iter().map(|r| r.video_filename.as_str()).collect();
        assert_eq!(names, ["next.mp4", "first.mp4"]);
        assert_eq!(
            store.get(&next).await.unwrap().unwrap().video_filename,
            "next.mp4"
        );
    }

    #[tokio::test]
    async fn test_concurrent_appends_stay_line_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            FileHistoryStore::open(dir.path().join("history.jsonl"))
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(record(&format!("{i}.mp4"), i)).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.list(Some(100)).await.unwrap().len(), 20);
        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(contents.lines().count(), 20);
    }

    #[tokio::test]
    async fn test_missing_file_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let store = FileHistoryStore::open(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(store.list(None).await.unwrap().is_empty());
        assert!(store.ping().await.is_err());
    }
}
