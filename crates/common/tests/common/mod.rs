//! Shared test utilities for storage, protocol and swarm integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use common::storage::{
    ingest, BlobFetcher, BlobId, BlobInfo, BlobStore, BlobStoreStats, FileEntry, IngestOptions,
    MemoryBlobStore, StorageError,
};

/// Route peer logs to the test writer; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic, non-repeating-looking test content
pub fn test_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8)
        .collect()
}

pub fn options(chunk_size: usize) -> IngestOptions {
    IngestOptions {
        chunk_size,
        pad: false,
    }
}

/// Ingest `data` into a fresh in-memory store
pub async fn stored(data: &[u8], chunk_size: usize) -> (FileEntry, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryBlobStore::new());
    let ingested = ingest(data, "test.bin", &options(chunk_size)).unwrap();
    for (id, blob) in ingested.blobs {
        store.put(id, blob).await.unwrap();
    }
    (ingested.entry, store)
}

/// Flip one byte of a blob
pub fn flip(data: &Bytes, index: usize) -> Bytes {
    let mut tampered = data.to_vec();
    tampered[index] ^= 0x01;
    Bytes::from(tampered)
}

/// A fetcher that records every id it is asked for
#[derive(Debug)]
pub struct RecordingFetcher {
    pub inner: Arc<MemoryBlobStore>,
    pub fetched: Mutex<Vec<BlobId>>,
}

impl RecordingFetcher {
    pub fn new(inner: Arc<MemoryBlobStore>) -> Self {
        Self {
            inner,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<BlobId> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl BlobFetcher for RecordingFetcher {
    async fn fetch(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError> {
        self.fetched.lock().push(*id);
        self.inner.get(id).await
    }
}

/// A fetcher over a fixed set of blobs, with no hash check on insert
#[derive(Debug, Default)]
pub struct MapFetcher {
    pub blobs: HashMap<BlobId, Bytes>,
}

impl MapFetcher {
    pub fn new(blobs: impl IntoIterator<Item = (BlobId, Bytes)>) -> Self {
        Self {
            blobs: blobs.into_iter().collect(),
        }
    }
}

#[async_trait]
impl BlobFetcher for MapFetcher {
    async fn fetch(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError> {
        Ok(self.blobs.get(id).cloned())
    }
}

/// A store that keeps blobs intact but serves every one of them corrupted
///
/// Stands in for a malicious or broken peer.
#[derive(Debug, Default)]
pub struct CorruptStore {
    inner: MemoryBlobStore,
}

#[async_trait]
impl BlobStore for CorruptStore {
    async fn has(&self, id: &BlobId) -> Result<bool, StorageError> {
        self.inner.has(id).await
    }

    async fn get(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError> {
        Ok(self.inner.get(id).await?.map(|data| flip(&data, data.len() / 2)))
    }

    async fn put(&self, id: BlobId, data: Bytes) -> Result<(), StorageError> {
        self.inner.put(id, data).await
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        self.inner.list().await
    }

    async fn stats(&self) -> Result<BlobStoreStats, StorageError> {
        self.inner.stats().await
    }
}
