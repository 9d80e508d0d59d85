use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::crypto::PublicKey;
use crate::manifest::Manifest;
use crate::storage::BlobId;

use super::{check_put, item_hash, Dht, DhtError, MutableRecord, DEFAULT_ANNOUNCE_HOST};

#[derive(Debug, Default)]
struct MemoryDhtInner {
    manifests: HashMap<PublicKey, Manifest>,
    providers: HashMap<BlobId, BTreeSet<String>>,
}

/// In-process DHT; clones share state
#[derive(Debug, Clone)]
pub struct MemoryDht {
    inner: Arc<RwLock<MemoryDhtInner>>,
    announce_host: String,
}

impl Default for MemoryDht {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDht {
    pub fn new() -> Self {
        Self::with_announce_host(DEFAULT_ANNOUNCE_HOST)
    }

    /// Record announcements under `host` instead of the loopback address
    pub fn with_announce_host(host: impl Into<String>) -> Self {
        Self {
            inner: Arc::default(),
            announce_host: host.into(),
        }
    }

    /// Register a provider address directly, bypassing the announce host
    pub fn add_provider(&self, blob_id: BlobId, address: impl Into<String>) {
        self.inner
            .write()
            .providers
            .entry(blob_id)
            .or_default()
            .insert(address.into());
    }
}

#[async_trait]
impl Dht for MemoryDht {
    async fn put_manifest(&self, manifest: &Manifest) -> Result<String, DhtError> {
        let mut inner = self.inner.write();
        let current = inner.manifests.get(&manifest.public_key).map(|m| m.sequence);
        check_put(manifest, current)?;
        inner
            .manifests
            .insert(manifest.public_key, manifest.clone());
        tracing::debug!(
            "MemoryDht: stored manifest {} at sequence {}",
            manifest.public_key,
            manifest.sequence
        );
        Ok(item_hash(&manifest.public_key))
    }

    async fn get_manifest(&self, public_key: &PublicKey) -> Result<Option<MutableRecord>, DhtError> {
        Ok(self
            .inner
            .read()
            .manifests
            .get(public_key)
            .map(|m| MutableRecord {
                manifest: m.clone(),
                seq: m.sequence,
            }))
    }

    async fn announce_blob(&self, blob_id: &BlobId, port: u16) -> Result<(), DhtError> {
        self.add_provider(*blob_id, format!("{}:{}", self.announce_host, port));
        Ok(())
    }

    async fn find_blob_peers(&self, blob_id: &BlobId) -> Result<Vec<String>, DhtError> {
        Ok(self
            .inner
            .read()
            .providers
            .get(blob_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    #[tokio::test]
    async fn test_last_writer_wins() {
        let dht = MemoryDht::new();
        let key = SecretKey::generate();

        let first = Manifest::create(&key, 10, vec![], None).unwrap();
        let hash = dht.put_manifest(&first).await.unwrap();
        assert_eq!(hash, item_hash(&key.public()));

        let stale = Manifest::create(&key, 10, vec![], None).unwrap();
        assert!(matches!(
            dht.put_manifest(&stale).await,
            Err(DhtError::Stale { current: 10, .. })
        ));

        let newer = Manifest::create(&key, 11, vec![], None).unwrap();
        dht.put_manifest(&newer).await.unwrap();

        let record = dht.get_manifest(&key.public()).await.unwrap().unwrap();
        assert_eq!(record.seq, 11);
        assert_eq!(record.manifest, newer);
    }

    #[tokio::test]
    async fn test_rejects_unsigned() {
        let dht = MemoryDht::new();
        let key = SecretKey::generate();
        let mut forged = Manifest::create(&key, 1, vec![], None).unwrap();
        forged.sequence = 2;
        assert!(matches!(
            dht.put_manifest(&forged).await,
            Err(DhtError::InvalidManifest(_))
        ));
        assert!(dht.get_manifest(&key.public()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_providers() {
        let dht = MemoryDht::new();
        let id = BlobId::of(b"blob");
        assert!(dht.find_blob_peers(&id).await.unwrap().is_empty());

        dht.announce_blob(&id, 4000).await.unwrap();
        dht.announce_blob(&id, 4000).await.unwrap();
        dht.add_provider(id, "10.0.0.2:4001");
        assert_eq!(
            dht.find_blob_peers(&id).await.unwrap(),
            vec!["10.0.0.2:4001".to_string(), "127.0.0.1:4000".to_string()]
        );
    }
}
