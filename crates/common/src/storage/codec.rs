use std::path::Path;

use bytes::Bytes;

use super::chunk::{decrypt_chunk, encrypt_chunk, FileEntry};
use super::{BlobFetcher, BlobId, BlobStore, StorageError, DEFAULT_CHUNK_SIZE};

/// Knobs for splitting a file into chunks
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub chunk_size: usize,
    /// Pad every chunk with random bytes up to `chunk_size`
    pub pad: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pad: false,
        }
    }
}

/// Output of [`ingest`]: the file's metadata and the blobs to persist
#[derive(Debug, Clone)]
pub struct Ingested {
    pub entry: FileEntry,
    pub blobs: Vec<(BlobId, Bytes)>,
}

/// Split `data` into chunks, encrypting each under its own key
pub fn ingest(data: &[u8], name: &str, options: &IngestOptions) -> Result<Ingested, StorageError> {
    if options.chunk_size == 0 {
        return Err(anyhow::anyhow!("chunk size must be non-zero").into());
    }
    let pad_to = options.pad.then_some(options.chunk_size);

    let mut chunks = Vec::with_capacity(data.len().div_ceil(options.chunk_size));
    let mut blobs = Vec::with_capacity(chunks.capacity());
    for piece in data.chunks(options.chunk_size) {
        let (meta, blob) = encrypt_chunk(piece, pad_to)?;
        blobs.push((meta.blob_id, blob));
        chunks.push(meta);
    }

    tracing::debug!(
        "ingest: {} ({} bytes) split into {} chunks",
        name,
        data.len(),
        chunks.len()
    );

    Ok(Ingested {
        entry: FileEntry {
            name: name.to_string(),
            size: data.len() as u64,
            chunks,
        },
        blobs,
    })
}

/// Read a file from disk, ingest it and persist every blob into `store`
pub async fn ingest_file<S>(
    path: &Path,
    store: &S,
    options: &IngestOptions,
) -> Result<FileEntry, StorageError>
where
    S: BlobStore + ?Sized,
{
    let data = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());

    let Ingested { entry, blobs } = ingest(&data, &name, options)?;
    for (id, blob) in blobs {
        store.put(id, blob).await?;
    }
    Ok(entry)
}

/// Fetch, verify and decrypt every chunk of `entry` in order
///
/// The entry is validated before anything is fetched. Any failure aborts the
/// whole file; no partial output is ever returned.
pub async fn reassemble<F>(entry: &FileEntry, fetcher: &F) -> Result<Vec<u8>, StorageError>
where
    F: BlobFetcher + ?Sized,
{
    entry.validate()?;

    let mut out = Vec::new();
    for meta in &entry.chunks {
        let blob = fetcher
            .fetch(&meta.blob_id)
            .await?
            .ok_or(StorageError::NotFound(meta.blob_id))?;
        out.extend_from_slice(&decrypt_chunk(meta, &blob)?);
    }

    if out.len() as u64 != entry.size {
        return Err(StorageError::Malformed(format!(
            "reassembled {} bytes, expected {}",
            out.len(),
            entry.size
        )));
    }
    Ok(out)
}
