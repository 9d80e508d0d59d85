use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;

use crate::channel::{announce_to_peer, download_blob, find_peers_via_pex};
use crate::storage::{
    open_range, reassemble, BlobFetcher, BlobId, FileEntry, RangeStream, StorageError,
};

use super::{Peer, PeerError};

impl Peer {
    /// Candidate sources for `blob_id`, in the order they should be tried
    ///
    /// The DHT is asked first. Only when it knows nobody are connected peers
    /// asked over PEX, all at once. Duplicates, blacklisted peers and our own
    /// addresses are dropped.
    pub async fn find_candidates(&self, blob_id: &BlobId) -> Vec<String> {
        let mut found = match self.dht.find_blob_peers(blob_id).await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!("find_candidates: DHT lookup for {} failed: {}", blob_id, e);
                Vec::new()
            }
        };

        if found.is_empty() {
            let connected = self.connected_peers();
            if !connected.is_empty() {
                tracing::debug!(
                    "find_candidates: DHT knows no source for {}, asking {} peers via PEX",
                    blob_id,
                    connected.len()
                );
                let lookups = connected
                    .iter()
                    .map(|peer| find_peers_via_pex(peer, blob_id, self.proxy()));
                found = join_all(lookups).await.into_iter().flatten().collect();
            }
        }

        let own = [Some(self.local_address()), self.external_address.clone()];
        let mut candidates: Vec<String> = Vec::with_capacity(found.len());
        for address in found {
            if candidates.contains(&address)
                || own.iter().flatten().any(|mine| mine == &address)
                || self.is_blacklisted(&address)
            {
                continue;
            }
            candidates.push(address);
        }
        candidates
    }

    /// Get a blob from the local store, or download it from the swarm
    ///
    /// On a successful download the blob is persisted, marked held and
    /// announced. A peer that serves bytes not matching `blob_id` is
    /// blacklisted; unreachable peers and misses just advance to the next
    /// candidate.
    pub async fn fetch_blob(&self, blob_id: &BlobId) -> Result<Bytes, PeerError> {
        if let Some(data) = self.store.get(blob_id).await? {
            return Ok(data);
        }

        let candidates = self.find_candidates(blob_id).await;
        if candidates.is_empty() {
            return Err(PeerError::NoPeers(*blob_id));
        }

        let sequences = self.known_sequences();
        for candidate in &candidates {
            match download_blob(candidate, blob_id, &sequences, self.proxy()).await {
                Ok(download) => {
                    tracing::debug!(
                        "fetch_blob: got {} ({} bytes) from {}",
                        blob_id,
                        download.data.len(),
                        candidate
                    );
                    self.handle_gossip(&download.remote_sequences);
                    self.store.put(*blob_id, download.data.clone()).await?;
                    self.mark_held(*blob_id);
                    self.add_connected_peer(candidate);
                    self.announce_source(blob_id, candidate).await;
                    return Ok(download.data);
                }
                Err(e) if e.is_integrity_failure() => {
                    tracing::warn!("fetch_blob: {} served a corrupt {}: {}", candidate, blob_id, e);
                    self.state.blacklist.write().insert(candidate);
                }
                Err(e) => {
                    tracing::debug!("fetch_blob: {} failed for {}: {}", candidate, blob_id, e);
                }
            }
        }

        Err(PeerError::Exhausted {
            blob_id: *blob_id,
            tried: candidates.len(),
        })
    }

    /// Tell the DHT, and the peer we just used, that we now hold `blob_id`
    async fn announce_source(&self, blob_id: &BlobId, served_by: &str) {
        if let Err(e) = self.dht.announce_blob(blob_id, self.port()).await {
            tracing::warn!("announce_source: DHT announce of {} failed: {}", blob_id, e);
        }
        if let Some(address) = self.external_address() {
            if let Err(e) = announce_to_peer(served_by, blob_id, address, self.proxy()).await {
                tracing::debug!(
                    "announce_source: ANNOUNCE of {} to {} failed: {}",
                    blob_id,
                    served_by,
                    e
                );
            }
        }
    }

    /// Download every chunk of `entry` and return the reassembled file
    ///
    /// The file is added to the local index, so this node can stream and
    /// seed it afterwards.
    pub async fn download_file(&self, entry: &FileEntry) -> Result<Vec<u8>, PeerError> {
        tracing::info!(
            "download_file: {} ({} bytes, {} chunks)",
            entry.name,
            entry.size,
            entry.chunks.len()
        );
        entry.validate()?;
        for meta in &entry.chunks {
            self.fetch_blob(&meta.blob_id).await?;
        }
        let data = reassemble(entry, self.store.as_ref()).await?;
        self.index_file(entry.clone());
        Ok(data)
    }

    /// Stream plaintext bytes `start ..= end` of `entry`, fetching chunks on demand
    pub fn open_stream(
        &self,
        entry: FileEntry,
        start: u64,
        end: u64,
    ) -> Result<RangeStream, StorageError> {
        open_range(
            Arc::new(entry),
            Arc::new(self.clone()),
            start,
            end,
            self.readahead,
        )
    }
}

/// Network-backed fetching for the streaming reader
///
/// A blob nobody can serve reads as missing rather than as an error.
#[async_trait]
impl BlobFetcher for Peer {
    async fn fetch(&self, id: &BlobId) -> Result<Option<Bytes>, StorageError> {
        match self.fetch_blob(id).await {
            Ok(data) => Ok(Some(data)),
            Err(PeerError::NoPeers(_)) | Err(PeerError::Exhausted { .. }) => Ok(None),
            Err(PeerError::Storage(e)) => Err(e),
            Err(e) => Err(StorageError::Default(anyhow::anyhow!(e))),
        }
    }
}
