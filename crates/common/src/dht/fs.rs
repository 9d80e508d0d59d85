use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::crypto::PublicKey;
use crate::manifest::Manifest;
use crate::storage::BlobId;

use super::{check_put, item_hash, Dht, DhtError, MutableRecord, DEFAULT_ANNOUNCE_HOST};

/// A DHT stand-in backed by a directory shared between local nodes
///
/// ```text
/// <root>/manifests/<public key hex>.json
/// <root>/providers/<blob id hex>.json
/// ```
#[derive(Debug, Clone)]
pub struct FsDht {
    root: PathBuf,
    announce_host: String,
    write_lock: Arc<Mutex<()>>,
}

impl FsDht {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, DhtError> {
        Self::open_with_host(root, DEFAULT_ANNOUNCE_HOST).await
    }

    pub async fn open_with_host(
        root: impl AsRef<Path>,
        announce_host: impl Into<String>,
    ) -> Result<Self, DhtError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join("manifests")).await?;
        tokio::fs::create_dir_all(root.join("providers")).await?;
        Ok(Self {
            root,
            announce_host: announce_host.into(),
            write_lock: Arc::default(),
        })
    }

    fn manifest_path(&self, public_key: &PublicKey) -> PathBuf {
        self.root
            .join("manifests")
            .join(format!("{}.json", public_key.to_hex()))
    }

    fn providers_path(&self, blob_id: &BlobId) -> PathBuf {
        self.root
            .join("providers")
            .join(format!("{}.json", blob_id.to_hex()))
    }

    async fn read_manifest(&self, public_key: &PublicKey) -> Result<Option<Manifest>, DhtError> {
        let json = match tokio::fs::read_to_string(self.manifest_path(public_key)).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Manifest::from_json(&json)?))
    }

    async fn read_providers(&self, blob_id: &BlobId) -> Result<BTreeSet<String>, DhtError> {
        match tokio::fs::read(self.providers_path(blob_id)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| anyhow::anyhow!("corrupt provider record for {}: {}", blob_id, e).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, path: &Path, contents: Vec<u8>) -> Result<(), DhtError> {
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn add_provider(&self, blob_id: &BlobId, address: String) -> Result<(), DhtError> {
        let _guard = self.write_lock.lock().await;
        let mut providers = self.read_providers(blob_id).await?;
        if providers.insert(address) {
            let json = serde_json::to_vec(&providers)
                .map_err(|e| anyhow::anyhow!("failed to encode providers: {}", e))?;
            self.write_atomic(&self.providers_path(blob_id), json).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Dht for FsDht {
    async fn put_manifest(&self, manifest: &Manifest) -> Result<String, DhtError> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .read_manifest(&manifest.public_key)
            .await?
            .map(|m| m.sequence);
        check_put(manifest, current)?;

        let json = manifest.to_json()?;
        self.write_atomic(&self.manifest_path(&manifest.public_key), json.into_bytes())
            .await?;
        tracing::debug!(
            "FsDht: stored manifest {} at sequence {}",
            manifest.public_key,
            manifest.sequence
        );
        Ok(item_hash(&manifest.public_key))
    }

    async fn get_manifest(&self, public_key: &PublicKey) -> Result<Option<MutableRecord>, DhtError> {
        Ok(self.read_manifest(public_key).await?.map(|manifest| {
            let seq = manifest.sequence;
            MutableRecord { manifest, seq }
        }))
    }

    async fn announce_blob(&self, blob_id: &BlobId, port: u16) -> Result<(), DhtError> {
        self.add_provider(blob_id, format!("{}:{}", self.announce_host, port))
            .await
    }

    async fn find_blob_peers(&self, blob_id: &BlobId) -> Result<Vec<String>, DhtError> {
        Ok(self.read_providers(blob_id).await?.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    #[tokio::test]
    async fn test_shared_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = FsDht::open(dir.path()).await.unwrap();
        let b = FsDht::open(dir.path()).await.unwrap();

        let key = SecretKey::generate();
        let manifest = Manifest::create(&key, 5, vec![], None).unwrap();
        a.put_manifest(&manifest).await.unwrap();

        let record = b.get_manifest(&key.public()).await.unwrap().unwrap();
        assert_eq!(record.seq, 5);
        assert!(record.manifest.validate().is_ok());

        let stale = Manifest::create(&key, 4, vec![], None).unwrap();
        assert!(matches!(
            b.put_manifest(&stale).await,
            Err(DhtError::Stale { .. })
        ));

        let id = BlobId::of(b"chunk");
        a.announce_blob(&id, 9000).await.unwrap();
        assert_eq!(
            b.find_blob_peers(&id).await.unwrap(),
            vec!["127.0.0.1:9000".to_string()]
        );
    }
}
