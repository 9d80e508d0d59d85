use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BlobId, StorageError};

/// Listing entry for a stored blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobInfo {
    pub blob_id: BlobId,
    pub size: u64,
    pub added_at: DateTime<Utc>,
}

/// Usage summary of a blob store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobStoreStats {
    pub blob_count: u64,
    pub current_size: u64,
    pub max_size: Option<u64>,
    /// `current_size / max_size`, or 0 when unbounded
    pub utilization: f64,
}

impl BlobStoreStats {
    pub fn new(blob_count: u64, current_size: u64, max_size: Option<u64>) -> Self {
        let utilization = match max_size {
            Some(max) if max > 0 => current_size as f64 / max as f64,
            _ => 0.0,
        };
        Self {
            blob_count,
            current_size,
            max_size,
            utilization,
        }
    }
}

/// Content-addressed byte storage
///
/// Implementations must be safe to call concurrently for the same id, and
/// `put` of an id that is already present must be a no-op.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    async fn has(&self, id: &BlobId) -> Result<bool, StorageError>;

    async fn get(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError>;

    /// Store `data` under `id`
    ///
    /// Rejects data that does not hash to `id` with
    /// [`StorageError::Integrity`].
    async fn put(&self, id: BlobId, data: Bytes) -> Result<(), StorageError>;

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError>;

    async fn stats(&self) -> Result<BlobStoreStats, StorageError>;
}

/// Anything that can produce a blob's bytes by id
///
/// Readers only ever need this half of a store, which lets a node hand out
/// a fetcher that falls back to the network on a local miss.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobFetcher for T {
    async fn fetch(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError> {
        self.get(id).await
    }
}
