//! In-memory history store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use vcount_models::{HistoryRecord, RecordId};

use crate::error::StorageResult;
use crate::history::{clamp_limit, most_recent_first, HistoryStore};

/// Process-local store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: RwLock<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> StorageResult<RecordId> {
        let id = record.id.clone();
        self.records.write().await.push(record);
        debug!(record_id = %id, "History record stored in memory");
        Ok(id)
    }

    async fn list(&self, limit: Option<usize>) -> StorageResult<Vec<HistoryRecord>> {
        let records = self.records.read().await.clone();
        Ok(most_recent_first(records, clamp_limit(limit)))
    }

    async fn get(&self, id: &RecordId) -> StorageResult<Option<HistoryRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| &r.id == id)
            .cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::record;

    #[tokio::test]
    async fn test_append_and_get() {
        let store = MemoryHistoryStore::new();
        let rec = record("lobby.mp4", 0);
        let id = store.append(rec.clone()).await.unwrap();

        assert_eq!(id, rec.id);
        assert_eq!(store.get(&id).await.unwrap(), Some(rec));
        assert!(store.get(&RecordId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_limit() {
        let store = MemoryHistoryStore::new();
        for minute in 0..15 {
            store.append(record(&format!("{minute}.mp4"), minute)).await.unwrap();
        }

        let listed = store.list(None).await.unwrap();
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0].video_filename, "14.mp4");
        assert_eq!(listed[9].video_filename, "5.mp4");

        assert_eq!(store.list(Some(2)).await.unwrap().len(), 2);
        assert_eq!(store.len().await, 15);
    }
}
