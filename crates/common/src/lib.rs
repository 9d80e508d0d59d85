/**
 * Encrypted, framed transport between peers.
 *  - Ephemeral X25519 handshake with per-direction keys
 *  - Length-prefixed ChaCha20-Poly1305 frames
 *  - Typed protocol messages and the client calls built on them
 */
pub mod channel;
/**
 * Cryptographic types and operations.
 *  - Ed25519 identities for signing manifests
 *  - Symmetric secrets for chunk and channel encryption
 */
pub mod crypto;
/**
 * The DHT collaborator: mutable manifest records
 *  and blob provider lookups.
 */
pub mod dht;
/**
 * Signed channel manifests, the collections they
 *  point to, and subscriber-side freshness tracking.
 */
pub mod manifest;
/**
 * The swarm node: serves, fetches, publishes
 *  and follows channels.
 */
pub mod peer;
/**
 * Chunked, encrypted, content-addressed blob storage
 *  and the streaming reader on top of it.
 */
pub mod storage;
/**
 * Harness for spinning up networks of local peers in tests.
 */
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::channel::{ProxyConfig, SecureChannel};
    pub use crate::crypto::{PublicKey, Secret, SecretKey};
    pub use crate::dht::{Dht, FsDht, MemoryDht};
    pub use crate::manifest::{ChannelView, Collection, Manifest, ManifestError};
    pub use crate::peer::{Peer, PeerBuilder, PeerError};
    pub use crate::storage::{
        BlobId, BlobStore, FileEntry, FsBlobStore, IngestOptions, MemoryBlobStore, StorageError,
    };
    pub use crate::version::build_info;
}
