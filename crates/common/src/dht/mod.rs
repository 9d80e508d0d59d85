//! DHT collaborator interface
//!
//! Nodes only consume four operations from the DHT: put/get of a signed
//! mutable manifest keyed by public key, and announce/lookup of blob
//! providers. Routing and replication are the DHT's business.
//!
//! Two implementations ship here:
//!
//! - [`MemoryDht`]: shared in-process state, for tests and single-process
//!   networks
//! - [`FsDht`]: a shared directory, so several local processes see the same
//!   records

mod fs;
mod memory;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::crypto::PublicKey;
use crate::manifest::{Manifest, ManifestError};
use crate::storage::BlobId;

pub use fs::FsDht;
pub use memory::MemoryDht;

/// Host recorded for announcements when the DHT cannot observe a source address
pub const DEFAULT_ANNOUNCE_HOST: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    #[error("rejected manifest: {0}")]
    InvalidManifest(#[from] ManifestError),
    #[error("stale manifest for {public_key}: sequence {offered} is not newer than {current}")]
    Stale {
        public_key: PublicKey,
        current: u64,
        offered: u64,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dht error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A mutable record as returned by [`Dht::get_manifest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableRecord {
    pub manifest: Manifest,
    pub seq: u64,
}

/// Address of a channel's mutable item: `sha256(public key)`
pub fn item_hash(public_key: &PublicKey) -> String {
    hex::encode(Sha256::digest(public_key.to_bytes()))
}

#[async_trait]
pub trait Dht: Send + Sync + std::fmt::Debug {
    /// Store a signed manifest, returning its item hash
    ///
    /// Last writer wins by highest sequence: unsigned manifests and
    /// sequences not above the stored one are rejected.
    async fn put_manifest(&self, manifest: &Manifest) -> Result<String, DhtError>;

    async fn get_manifest(&self, public_key: &PublicKey) -> Result<Option<MutableRecord>, DhtError>;

    /// Record this node as a provider of `blob_id`, reachable on `port`
    async fn announce_blob(&self, blob_id: &BlobId, port: u16) -> Result<(), DhtError>;

    /// Known providers of `blob_id` as `host:port` strings
    async fn find_blob_peers(&self, blob_id: &BlobId) -> Result<Vec<String>, DhtError>;
}

/// Checks shared by every implementation before accepting a put
pub(crate) fn check_put(manifest: &Manifest, current: Option<u64>) -> Result<(), DhtError> {
    manifest.validate()?;
    if let Some(current) = current {
        if manifest.sequence <= current {
            return Err(DhtError::Stale {
                public_key: manifest.public_key,
                current,
                offered: manifest.sequence,
            });
        }
    }
    Ok(())
}
