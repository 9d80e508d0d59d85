use std::collections::{HashMap, VecDeque};

use crate::storage::BlobId;

/// Blobs tracked before the oldest entry is evicted
pub const DEFAULT_MAX_BLOBS: usize = 10_000;
/// Addresses remembered per blob
pub const DEFAULT_MAX_PEERS_PER_BLOB: usize = 32;

/// Peer-exchange cache: who told us they can serve which blob
///
/// Bounded in both directions. Each blob keeps its most recent addresses,
/// and once too many blobs are tracked the one inserted longest ago is
/// dropped.
#[derive(Debug)]
pub struct PexCache {
    entries: HashMap<BlobId, VecDeque<String>>,
    order: VecDeque<BlobId>,
    max_blobs: usize,
    max_peers_per_blob: usize,
}

impl Default for PexCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOBS, DEFAULT_MAX_PEERS_PER_BLOB)
    }
}

impl PexCache {
    pub fn new(max_blobs: usize, max_peers_per_blob: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_blobs: max_blobs.max(1),
            max_peers_per_blob: max_peers_per_blob.max(1),
        }
    }

    pub fn insert(&mut self, blob_id: BlobId, address: String) {
        let addresses = match self.entries.get_mut(&blob_id) {
            Some(addresses) => addresses,
            None => {
                if self.order.len() >= self.max_blobs {
                    if let Some(evicted) = self.order.pop_front() {
                        self.entries.remove(&evicted);
                    }
                }
                self.order.push_back(blob_id);
                self.entries.entry(blob_id).or_default()
            }
        };

        addresses.retain(|known| known != &address);
        addresses.push_back(address);
        while addresses.len() > self.max_peers_per_blob {
            addresses.pop_front();
        }
    }

    /// Addresses for `blob_id`, most recently announced last
    pub fn get(&self, blob_id: &BlobId) -> Vec<String> {
        self.entries
            .get(blob_id)
            .map(|addresses| addresses.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
