use std::path::Path;

use bytes::Bytes;

use crate::storage::{ingest, ingest_file, BlobId, FileEntry, IngestOptions, Ingested};

use super::{Peer, PeerError};

impl Peer {
    /// Ingest `data` into the local store and start seeding it
    pub async fn add_file(
        &self,
        data: &[u8],
        name: &str,
        options: &IngestOptions,
    ) -> Result<FileEntry, PeerError> {
        let Ingested { entry, blobs } = ingest(data, name, options)?;
        for (id, blob) in blobs {
            self.store.put(id, blob).await?;
        }
        self.seed(&entry).await;
        Ok(entry)
    }

    /// Ingest a file from disk and start seeding it
    pub async fn add_path(
        &self,
        path: &Path,
        options: &IngestOptions,
    ) -> Result<FileEntry, PeerError> {
        let entry = ingest_file(path, self.store.as_ref(), options).await?;
        self.seed(&entry).await;
        Ok(entry)
    }

    /// Store a blob received out of band under its content address
    pub async fn add_blob(&self, data: Bytes) -> Result<BlobId, PeerError> {
        let id = BlobId::of(&data);
        self.store.put(id, data).await?;
        self.mark_held(id);
        Ok(id)
    }

    async fn seed(&self, entry: &FileEntry) {
        for meta in &entry.chunks {
            self.mark_held(meta.blob_id);
            if let Err(e) = self.dht.announce_blob(&meta.blob_id, self.port()).await {
                tracing::warn!("seed: announce of {} failed: {}", meta.blob_id, e);
            }
        }
        tracing::info!(
            "seed: {} ({} bytes) in {} chunks",
            entry.name,
            entry.size,
            entry.chunks.len()
        );
        self.index_file(entry.clone());
    }
}
