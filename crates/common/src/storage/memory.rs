use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{BlobId, BlobInfo, BlobStore, BlobStoreStats, StorageError};

/// In-memory blob store, for tests and ephemeral nodes
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<BlobId, (Bytes, DateTime<Utc>)>>>,
    max_size: Option<u64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_size: u64) -> Self {
        Self {
            inner: Arc::default(),
            max_size: Some(max_size),
        }
    }

    fn current_size(&self) -> u64 {
        self.inner.read().values().map(|(b, _)| b.len() as u64).sum()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn has(&self, id: &BlobId) -> Result<bool, StorageError> {
        Ok(self.inner.read().contains_key(id))
    }

    async fn get(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError> {
        Ok(self.inner.read().get(id).map(|(b, _)| b.clone()))
    }

    async fn put(&self, id: BlobId, data: Bytes) -> Result<(), StorageError> {
        if !id.matches(&data) {
            return Err(StorageError::Integrity(id));
        }
        let mut inner = self.inner.write();
        if inner.contains_key(&id) {
            return Ok(());
        }
        if let Some(max) = self.max_size {
            let current: u64 = inner.values().map(|(b, _)| b.len() as u64).sum();
            let needed = data.len() as u64;
            if current + needed > max {
                return Err(StorageError::StorageFull {
                    needed,
                    available: max.saturating_sub(current),
                });
            }
        }
        inner.insert(id, (data, Utc::now()));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let mut infos: Vec<BlobInfo> = self
            .inner
            .read()
            .iter()
            .map(|(id, (data, added_at))| BlobInfo {
                blob_id: *id,
                size: data.len() as u64,
                added_at: *added_at,
            })
            .collect();
        infos.sort_by_key(|i| i.added_at);
        Ok(infos)
    }

    async fn stats(&self) -> Result<BlobStoreStats, StorageError> {
        let count = self.inner.read().len() as u64;
        Ok(BlobStoreStats::new(count, self.current_size(), self.max_size))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_put_get_dedup() {
        let store = MemoryBlobStore::new();
        let data = Bytes::from_static(b"blob bytes");
        let id = BlobId::of(&data);

        assert!(!store.has(&id).await.unwrap());
        store.put(id, data.clone()).await.unwrap();
        store.put(id, data.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(data));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.blob_count, 1);
        assert_eq!(stats.current_size, 10);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_wrong_id() {
        let store = MemoryBlobStore::new();
        let err = store
            .put(BlobId::of(b"a"), Bytes::from_static(b"b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_capacity() {
        let store = MemoryBlobStore::with_max_size(8);
        let small = Bytes::from_static(b"1234");
        store.put(BlobId::of(&small), small).await.unwrap();

        let big = Bytes::from_static(b"123456789");
        let err = store.put(BlobId::of(&big), big).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::StorageFull {
                needed: 9,
                available: 4
            }
        ));
        assert_eq!(store.stats().await.unwrap().utilization, 0.5);
    }
}
