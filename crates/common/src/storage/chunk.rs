use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::crypto::{random_nonce, Secret, NONCE_SIZE, TAG_SIZE};

use super::{BlobId, StorageError};

/// Everything needed to fetch, verify and decrypt one chunk
///
/// A blob is laid out as `nonce (12) || ciphertext || tag (16)`.
/// `offset` locates that record inside the blob (ingest always writes it at
/// 0), `length` counts `ciphertext || tag`, and `real_size` is the plaintext
/// length before padding.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub blob_id: BlobId,
    pub offset: u64,
    pub length: u64,
    pub key: Secret,
    #[serde_as(as = "Hex")]
    pub nonce: [u8; NONCE_SIZE],
    pub real_size: u64,
}

/// A file as an ordered list of encrypted chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub chunks: Vec<ChunkMeta>,
}

impl FileEntry {
    /// The id a file is addressed by outside of a manifest: its first chunk's
    /// blob id. Empty files have none.
    pub fn id(&self) -> Option<BlobId> {
        self.chunks.first().map(|c| c.blob_id)
    }

    /// Check that the chunk list actually describes a file of `size` bytes
    ///
    /// Entries arrive inside manifests from other publishers, so nothing in
    /// them is trusted until this passes.
    pub fn validate(&self) -> Result<(), StorageError> {
        let mut total = 0u64;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let capacity = chunk.length.checked_sub(TAG_SIZE as u64).ok_or_else(|| {
                StorageError::Malformed(format!(
                    "chunk {} length {} is shorter than the tag",
                    i, chunk.length
                ))
            })?;
            if chunk.real_size > capacity {
                return Err(StorageError::Malformed(format!(
                    "chunk {} real size {} exceeds its ciphertext of {} bytes",
                    i, chunk.real_size, capacity
                )));
            }
            total = total.checked_add(chunk.real_size).ok_or_else(|| {
                StorageError::Malformed(format!("chunk sizes of {} overflow", self.name))
            })?;
        }
        if total != self.size {
            return Err(StorageError::Malformed(format!(
                "{} claims {} bytes but its chunks hold {}",
                self.name, self.size, total
            )));
        }
        Ok(())
    }

    /// Plaintext byte offset at which each chunk starts
    pub fn chunk_starts(&self) -> Vec<u64> {
        self.chunks
            .iter()
            .scan(0u64, |acc, chunk| {
                let start = *acc;
                *acc = acc.saturating_add(chunk.real_size);
                Some(start)
            })
            .collect()
    }

    /// Index of the chunk holding plaintext byte `offset`
    pub fn chunk_at(&self, offset: u64) -> Option<usize> {
        if offset >= self.size {
            return None;
        }
        let starts = self.chunk_starts();
        match starts.binary_search(&offset) {
            Ok(mut i) => {
                // skip over zero-length chunks sharing this start
                while i + 1 < starts.len() && starts[i + 1] == offset {
                    i += 1;
                }
                Some(i)
            }
            Err(i) => Some(i - 1),
        }
    }
}

/// Encrypt one chunk under a fresh key and nonce
///
/// When `pad_to` is set and larger than the plaintext, random bytes are
/// appended before sealing so every blob has the same size.
pub fn encrypt_chunk(
    plaintext: &[u8],
    pad_to: Option<usize>,
) -> Result<(ChunkMeta, Bytes), StorageError> {
    let key = Secret::generate();
    let nonce = random_nonce();

    let sealed = match pad_to {
        Some(target) if target > plaintext.len() => {
            let mut padded = Vec::with_capacity(target);
            padded.extend_from_slice(plaintext);
            let mut filler = vec![0u8; target - plaintext.len()];
            rand::rng().fill_bytes(&mut filler);
            padded.extend_from_slice(&filler);
            key.seal(&nonce, &padded)
        }
        _ => key.seal(&nonce, plaintext),
    }
    .map_err(|e| anyhow::anyhow!("failed to seal chunk: {}", e))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    let blob = Bytes::from(blob);

    let meta = ChunkMeta {
        blob_id: BlobId::of(&blob),
        offset: 0,
        length: sealed.len() as u64,
        key,
        nonce,
        real_size: plaintext.len() as u64,
    };
    Ok((meta, blob))
}

/// Verify and decrypt one chunk, returning exactly `real_size` bytes
///
/// # Errors
///
/// - [`StorageError::Integrity`] if `blob` does not hash to `meta.blob_id`
/// - [`StorageError::Decryption`] if the nonce or the tag does not match
/// - [`StorageError::Malformed`] if the metadata does not describe the blob
pub fn decrypt_chunk(meta: &ChunkMeta, blob: &[u8]) -> Result<Vec<u8>, StorageError> {
    if !meta.blob_id.matches(blob) {
        return Err(StorageError::Integrity(meta.blob_id));
    }

    let bounds = usize::try_from(meta.offset).ok().and_then(|start| {
        let length = usize::try_from(meta.length).ok()?;
        let end = start.checked_add(NONCE_SIZE)?.checked_add(length)?;
        Some((start, end))
    });
    let (start, end) = match bounds {
        Some((start, end)) if meta.length >= TAG_SIZE as u64 && end <= blob.len() => (start, end),
        _ => {
            return Err(StorageError::Malformed(format!(
                "chunk record at {} of {} bytes exceeds blob {} of {} bytes",
                meta.offset,
                meta.length,
                meta.blob_id,
                blob.len()
            )))
        }
    };
    let record = &blob[start..end];

    if record[..NONCE_SIZE] != meta.nonce {
        return Err(StorageError::Decryption(meta.blob_id));
    }

    let mut plaintext = meta
        .key
        .open(&meta.nonce, &record[NONCE_SIZE..])
        .map_err(|_| StorageError::Decryption(meta.blob_id))?;

    if meta.real_size > plaintext.len() as u64 {
        return Err(StorageError::Malformed(format!(
            "real size {} exceeds decrypted length {}",
            meta.real_size,
            plaintext.len()
        )));
    }
    plaintext.truncate(meta.real_size as usize);
    Ok(plaintext)
}
