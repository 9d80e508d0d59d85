//! Encrypted, framed peer-to-peer channel
//!
//! Every connection starts with a raw exchange of ephemeral X25519 public
//! keys (32 bytes each way). Both ends then derive one key per direction:
//!
//! ```text
//! server -> client = blake3(shared || "S")
//! client -> server = blake3(shared || "C")
//! ```
//!
//! After that every frame on the wire is
//!
//! ```text
//! u16 big-endian length || ChaCha20-Poly1305(type || body)
//! ```
//!
//! with a per-direction counter as the nonce. A frame that fails
//! authentication tears the channel down.

mod client;
mod frame;
mod handshake;
pub mod messages;
mod secure;
mod transport;

use std::time::Duration;

use crate::storage::BlobId;

pub use client::{
    announce_to_peer, download_blob, find_peers_via_pex, publish_via_gateway, BlobDownload,
};
pub use frame::{
    encode_frame, FrameCipher, FrameDecoder, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE,
    MAX_PLAINTEXT_SIZE,
};
pub use handshake::{
    EphemeralKeypair, Role, SessionKeys, CLIENT_TO_SERVER_SALT, HANDSHAKE_KEY_SIZE,
    SERVER_TO_CLIENT_SALT,
};
pub use messages::{Announce, Hello, Message, MessageType, Sequences, NOT_FOUND};
pub use secure::SecureChannel;
pub use transport::{connect, BoxedTransport, ProxyConfig, Transport};

/// Wire protocol version carried in HELLO
pub const PROTOCOL_VERSION: u32 = 1;

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
pub const PEX_TIMEOUT: Duration = Duration::from_secs(5);
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
pub const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest blob a client will accumulate from DATA frames
pub const MAX_BLOB_SIZE: usize = 64 * 1024 * 1024;
/// Largest DATA body per frame, leaving room for the type byte
pub const MAX_DATA_BODY: usize = MAX_PLAINTEXT_SIZE - 1;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("frame failed authentication")]
    Decryption,
    #[error("integrity check failed: expected {expected}, received {actual}")]
    Integrity { expected: BlobId, actual: BlobId },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("peer does not hold blob {0}")]
    NotFound(BlobId),
    #[error("peer replied with error: {0}")]
    Remote(String),
    #[error("channel closed")]
    Closed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Whether the remote served bytes that do not match what was asked for
    ///
    /// Only these get a peer blacklisted; everything else just moves the
    /// caller on to the next candidate.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, ChannelError::Integrity { .. })
    }
}
