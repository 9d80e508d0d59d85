//! Chunked, encrypted, content-addressed storage
//!
//! Files are split into fixed-size chunks. Each chunk is sealed with
//! ChaCha20-Poly1305 under a key generated for that chunk alone and a random
//! nonce, and stored as a blob addressed by the sha256 of its bytes:
//!
//! ```text
//! blob = nonce (12) || ciphertext || tag (16)
//! id   = sha256(blob)
//! ```
//!
//! The resulting [`FileEntry`] carries every chunk's key, so whoever holds the
//! entry (normally via a manifest) can read the file, while peers that only
//! seed the blobs learn nothing about the content.

mod blob_id;
mod chunk;
mod codec;
mod fs;
mod memory;
mod reader;
mod store;

pub use blob_id::{BlobId, BlobIdError, BLOB_ID_SIZE};
pub use chunk::{decrypt_chunk, encrypt_chunk, ChunkMeta, FileEntry};
pub use codec::{ingest, ingest_file, reassemble, IngestOptions, Ingested};
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use reader::{open_file, open_range, RangeStream, DEFAULT_READAHEAD};
pub use store::{BlobFetcher, BlobInfo, BlobStore, BlobStoreStats};

/// Default chunk size: 1 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(BlobId),
    #[error("integrity check failed: blob does not hash to {0}")]
    Integrity(BlobId),
    #[error("failed to decrypt blob {0}")]
    Decryption(BlobId),
    #[error("malformed chunk: {0}")]
    Malformed(String),
    #[error("invalid range {start}-{end} for a file of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },
    #[error("storage full: {needed} bytes needed, {available} available")]
    StorageFull { needed: u64, available: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Default(#[from] anyhow::Error),
}
