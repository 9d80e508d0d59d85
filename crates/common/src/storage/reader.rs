//! Lazy, range-addressable decryption over a [`FileEntry`]
//!
//! A range stream decrypts one chunk per pull and yields exactly the bytes of
//! the requested window that fall inside it. After the demand fetch for chunk
//! `i` returns, chunks `i+1 ..= i+readahead` are requested in spawned tasks
//! so a caching fetcher has them ready by the time the reader gets there.
//! Prefetch failures are logged and dropped; only the demand path can fail
//! the stream.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use super::chunk::{decrypt_chunk, FileEntry};
use super::{BlobFetcher, StorageError};

pub const DEFAULT_READAHEAD: usize = 3;

pub type RangeStream = BoxStream<'static, Result<Bytes, StorageError>>;

struct Cursor<F: ?Sized> {
    entry: Arc<FileEntry>,
    starts: Vec<u64>,
    fetcher: Arc<F>,
    index: usize,
    pos: u64,
    end: u64,
    readahead: usize,
    /// chunks below this index have already been requested
    prefetched_to: usize,
}

impl<F> Cursor<F>
where
    F: BlobFetcher + ?Sized + 'static,
{
    fn prefetch_after(&mut self, i: usize) {
        let last = (i + self.readahead).min(self.entry.chunks.len() - 1);
        let first = self.prefetched_to.max(i + 1);
        for j in first..=last {
            let fetcher = self.fetcher.clone();
            let blob_id = self.entry.chunks[j].blob_id;
            tokio::spawn(async move {
                match fetcher.fetch(&blob_id).await {
                    Ok(Some(_)) => tracing::trace!("prefetch: warmed chunk {} ({})", j, blob_id),
                    Ok(None) => tracing::debug!("prefetch: chunk {} ({}) unavailable", j, blob_id),
                    Err(e) => tracing::debug!("prefetch: chunk {} ({}) failed: {}", j, blob_id, e),
                }
            });
        }
        self.prefetched_to = self.prefetched_to.max(last + 1);
    }

    async fn next_window(mut self) -> Result<Option<(Bytes, Self)>, StorageError> {
        loop {
            if self.pos > self.end || self.index >= self.entry.chunks.len() {
                return Ok(None);
            }
            let i = self.index;
            let meta = &self.entry.chunks[i];
            if meta.real_size == 0 {
                self.index += 1;
                continue;
            }

            let blob = self
                .fetcher
                .fetch(&meta.blob_id)
                .await?
                .ok_or(StorageError::NotFound(meta.blob_id))?;
            let plaintext = Bytes::from(decrypt_chunk(meta, &blob)?);

            let chunk_start = self.starts[i];
            let chunk_last = chunk_start + meta.real_size - 1;
            let from = (self.pos - chunk_start) as usize;
            let to = (self.end.min(chunk_last) - chunk_start) as usize;
            if from > to || to >= plaintext.len() {
                return Err(StorageError::Malformed(format!(
                    "window {}..={} outside chunk {} of {} bytes",
                    from,
                    to,
                    i,
                    plaintext.len()
                )));
            }
            let window = plaintext.slice(from..=to);

            self.prefetch_after(i);
            self.pos = chunk_start + to as u64 + 1;
            self.index += 1;
            return Ok(Some((window, self)));
        }
    }
}

/// Open a stream over plaintext bytes `start ..= end` of `entry`
///
/// # Errors
///
/// Returns [`StorageError::Malformed`] if the entry's chunks do not add up
/// to its size, and [`StorageError::InvalidRange`] if `start > end` or `end`
/// is past the end of a non-empty file. An empty file yields an empty stream.
pub fn open_range<F>(
    entry: Arc<FileEntry>,
    fetcher: Arc<F>,
    start: u64,
    end: u64,
    readahead: usize,
) -> Result<RangeStream, StorageError>
where
    F: BlobFetcher + ?Sized + 'static,
{
    entry.validate()?;
    if entry.size == 0 {
        return Ok(stream::empty().boxed());
    }
    if start > end || end >= entry.size {
        return Err(StorageError::InvalidRange {
            start,
            end,
            size: entry.size,
        });
    }
    let index = entry.chunk_at(start).ok_or(StorageError::InvalidRange {
        start,
        end,
        size: entry.size,
    })?;

    tracing::debug!(
        "open_range: {} bytes {}-{} starting at chunk {}",
        entry.name,
        start,
        end,
        index
    );

    let cursor = Cursor {
        starts: entry.chunk_starts(),
        entry,
        fetcher,
        index,
        pos: start,
        end,
        readahead,
        prefetched_to: index + 1,
    };
    Ok(stream::try_unfold(cursor, Cursor::next_window).boxed())
}

/// Open a stream over the whole file
pub fn open_file<F>(
    entry: Arc<FileEntry>,
    fetcher: Arc<F>,
    readahead: usize,
) -> Result<RangeStream, StorageError>
where
    F: BlobFetcher + ?Sized + 'static,
{
    let end = entry.size.saturating_sub(1);
    open_range(entry, fetcher, 0, end, readahead)
}

#[cfg(test)]
mod test {
    use futures::TryStreamExt;

    use super::*;
    use crate::storage::{ingest, BlobStore, IngestOptions, MemoryBlobStore};

    async fn stored(data: &[u8], chunk_size: usize) -> (Arc<FileEntry>, Arc<MemoryBlobStore>) {
        let store = MemoryBlobStore::new();
        let options = IngestOptions {
            chunk_size,
            pad: false,
        };
        let ingested = ingest(data, "file", &options).unwrap();
        for (id, blob) in ingested.blobs {
            store.put(id, blob).await.unwrap();
        }
        (Arc::new(ingested.entry), Arc::new(store))
    }

    async fn collect(stream: RangeStream) -> Result<Vec<u8>, StorageError> {
        let windows: Vec<Bytes> = stream.try_collect().await?;
        Ok(windows.concat())
    }

    #[tokio::test]
    async fn test_window_per_chunk() {
        let data: Vec<u8> = (0..100u8).collect();
        let (entry, store) = stored(&data, 30).await;

        let windows: Vec<Bytes> = open_range(entry, store, 25, 65, 0)
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let lens: Vec<usize> = windows.iter().map(|w| w.len()).collect();
        assert_eq!(lens, vec![5, 30, 6]);
        assert_eq!(windows.concat(), &data[25..=65]);
    }

    #[tokio::test]
    async fn test_single_byte() {
        let data: Vec<u8> = (0..100u8).collect();
        let (entry, store) = stored(&data, 30).await;
        let out = collect(open_range(entry, store, 59, 59, 3).unwrap()).await.unwrap();
        assert_eq!(out, vec![59]);
    }

    #[tokio::test]
    async fn test_invalid_ranges() {
        let (entry, store) = stored(&[1u8; 10], 4).await;
        assert!(matches!(
            open_range(entry.clone(), store.clone(), 5, 4, 0),
            Err(StorageError::InvalidRange { .. })
        ));
        assert!(matches!(
            open_range(entry, store, 0, 10, 0),
            Err(StorageError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (entry, store) = stored(&[], 4).await;
        assert!(collect(open_file(entry, store, 3).unwrap()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_chunk_fails_stream() {
        let data = vec![9u8; 40];
        let store = Arc::new(MemoryBlobStore::new());
        let options = IngestOptions {
            chunk_size: 10,
            pad: false,
        };
        let ingested = ingest(&data, "holes", &options).unwrap();
        // store everything but the third chunk
        for (i, (id, blob)) in ingested.blobs.into_iter().enumerate() {
            if i != 2 {
                store.put(id, blob).await.unwrap();
            }
        }
        let entry = Arc::new(ingested.entry);
        let missing = entry.chunks[2].blob_id;

        let mut stream = open_file(entry, store, 0).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 10);
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 10);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StorageError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_size_beyond_chunks_is_malformed() {
        let (entry, store) = stored(b"0123456789", 30).await;
        let mut inflated = (*entry).clone();
        inflated.size = 100;
        assert!(matches!(
            open_range(Arc::new(inflated), store, 50, 60, 0),
            Err(StorageError::Malformed(_))
        ));
    }
}
