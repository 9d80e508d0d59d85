//! Blob store backed by a local directory
//!
//! Blobs live at `<root>/<ab>/<cd>/<blob id hex>` where `ab` and `cd` are the
//! first two bytes of the id. Writes go to `<root>/tmp` first and are renamed
//! into place, so a reader never sees a partially written blob.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{BlobId, BlobInfo, BlobStore, BlobStoreStats, StorageError};

const TMP_DIR: &str = "tmp";

#[derive(Debug, Default)]
struct Usage {
    blob_count: u64,
    current_size: u64,
    in_flight: HashSet<BlobId>,
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    max_size: Option<u64>,
    usage: Arc<Mutex<Usage>>,
}

impl FsBlobStore {
    /// Open (or create) a store rooted at `root`
    ///
    /// Existing blobs are scanned to seed the usage counters, and any
    /// leftover temp files from an interrupted write are removed.
    pub async fn open(root: impl AsRef<Path>, max_size: Option<u64>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let tmp = root.join(TMP_DIR);
        if tokio::fs::try_exists(&tmp).await? {
            tokio::fs::remove_dir_all(&tmp).await?;
        }
        tokio::fs::create_dir_all(&tmp).await?;

        let store = Self {
            root,
            max_size,
            usage: Arc::default(),
        };

        let blobs = store.scan().await?;
        {
            let mut usage = store.usage.lock();
            usage.blob_count = blobs.len() as u64;
            usage.current_size = blobs.iter().map(|b| b.size).sum();
        }
        tracing::info!(
            "FsBlobStore: opened {:?} with {} blobs",
            store.root,
            blobs.len()
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &BlobId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(hex)
    }

    async fn scan(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let mut infos = Vec::new();
        let mut level1 = tokio::fs::read_dir(&self.root).await?;
        while let Some(shard1) = level1.next_entry().await? {
            if shard1.file_name() == TMP_DIR || !shard1.file_type().await?.is_dir() {
                continue;
            }
            let mut level2 = tokio::fs::read_dir(shard1.path()).await?;
            while let Some(shard2) = level2.next_entry().await? {
                if !shard2.file_type().await?.is_dir() {
                    continue;
                }
                let mut blobs = tokio::fs::read_dir(shard2.path()).await?;
                while let Some(blob) = blobs.next_entry().await? {
                    let name = blob.file_name();
                    let Ok(blob_id) = BlobId::from_hex(&name.to_string_lossy()) else {
                        tracing::warn!("FsBlobStore: skipping stray file {:?}", blob.path());
                        continue;
                    };
                    let metadata = blob.metadata().await?;
                    let added_at: DateTime<Utc> = metadata
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    infos.push(BlobInfo {
                        blob_id,
                        size: metadata.len(),
                        added_at,
                    });
                }
            }
        }
        Ok(infos)
    }

    /// Reserve room for `needed` bytes, failing if over capacity
    ///
    /// Returns `false` if another task is already writing `id`.
    fn reserve(&self, id: BlobId, needed: u64) -> Result<bool, StorageError> {
        let mut usage = self.usage.lock();
        if usage.in_flight.contains(&id) {
            return Ok(false);
        }
        if let Some(max) = self.max_size {
            if usage.current_size + needed > max {
                return Err(StorageError::StorageFull {
                    needed,
                    available: max.saturating_sub(usage.current_size),
                });
            }
        }
        usage.current_size += needed;
        usage.blob_count += 1;
        usage.in_flight.insert(id);
        Ok(true)
    }

    fn finish(&self, id: &BlobId, failed_size: Option<u64>) {
        let mut usage = self.usage.lock();
        usage.in_flight.remove(id);
        if let Some(size) = failed_size {
            usage.current_size = usage.current_size.saturating_sub(size);
            usage.blob_count = usage.blob_count.saturating_sub(1);
        }
    }

    async fn write_atomic(&self, path: &Path, id: &BlobId, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut suffix = [0u8; 8];
        getrandom::getrandom(&mut suffix).map_err(|e| anyhow::anyhow!("rng failure: {}", e))?;
        let tmp = self
            .root
            .join(TMP_DIR)
            .join(format!("{}.{}", id.to_hex(), hex::encode(suffix)));

        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn has(&self, id: &BlobId) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.blob_path(id)).await?)
    }

    async fn get(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError> {
        match tokio::fs::read(self.blob_path(id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, id: BlobId, data: Bytes) -> Result<(), StorageError> {
        if !id.matches(&data) {
            return Err(StorageError::Integrity(id));
        }
        let path = self.blob_path(&id);
        if tokio::fs::try_exists(&path).await? {
            tracing::debug!("FsBlobStore: {} already stored", id);
            return Ok(());
        }

        let size = data.len() as u64;
        if !self.reserve(id, size)? {
            return Ok(());
        }
        if let Err(e) = self.write_atomic(&path, &id, &data).await {
            self.finish(&id, Some(size));
            return Err(e);
        }
        self.finish(&id, None);
        tracing::debug!("FsBlobStore: stored {} ({} bytes)", id, size);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let mut infos = self.scan().await?;
        infos.sort_by_key(|i| i.added_at);
        Ok(infos)
    }

    async fn stats(&self) -> Result<BlobStoreStats, StorageError> {
        let usage = self.usage.lock();
        Ok(BlobStoreStats::new(
            usage.blob_count,
            usage.current_size,
            self.max_size,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_sharded_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path(), None).await.unwrap();

        let data = Bytes::from_static(b"sharded blob");
        let id = BlobId::of(&data);
        store.put(id, data.clone()).await.unwrap();

        let hex = id.to_hex();
        let expected = dir.path().join(&hex[0..2]).join(&hex[2..4]).join(&hex);
        assert!(expected.exists());
        assert_eq!(store.get(&id).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data = Bytes::from_static(b"persistent");
        let id = BlobId::of(&data);
        {
            let store = FsBlobStore::open(dir.path(), None).await.unwrap();
            store.put(id, data.clone()).await.unwrap();
        }

        let store = FsBlobStore::open(dir.path(), None).await.unwrap();
        assert!(store.has(&id).await.unwrap());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.blob_count, 1);
        assert_eq!(stats.current_size, data.len() as u64);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].blob_id, id);
    }

    #[tokio::test]
    async fn test_dedup_does_not_double_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path(), None).await.unwrap();
        let data = Bytes::from_static(b"twice");
        let id = BlobId::of(&data);
        store.put(id, data.clone()).await.unwrap();
        store.put(id, data).await.unwrap();
        assert_eq!(store.stats().await.unwrap().blob_count, 1);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path(), Some(10)).await.unwrap();

        let fits = Bytes::from_static(b"12345678");
        store.put(BlobId::of(&fits), fits).await.unwrap();

        let overflow = Bytes::from_static(b"abc");
        let err = store.put(BlobId::of(&overflow), overflow).await.unwrap_err();
        assert!(matches!(err, StorageError::StorageFull { .. }));
        assert_eq!(store.stats().await.unwrap().blob_count, 1);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path(), None).await.unwrap();
        let id = BlobId::of(b"nothing");
        assert!(!store.has(&id).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap(), None);
    }
}
