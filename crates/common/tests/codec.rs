//! Integration tests for ingest, reassembly and tamper detection

mod common;

use ::common::storage::{
    ingest, ingest_file, reassemble, BlobId, BlobStore, FsBlobStore, IngestOptions, MemoryBlobStore,
    StorageError,
};
use tempfile::TempDir;

const CHUNK: usize = 1024;

#[tokio::test]
async fn test_round_trip_sizes() {
    for size in [0, 1, CHUNK - 1, CHUNK, CHUNK + 1, 5 * CHUNK + 500] {
        let data = common::test_data(size);
        let (entry, store) = common::stored(&data, CHUNK).await;

        assert_eq!(entry.size, size as u64);
        assert_eq!(entry.chunks.len(), size.div_ceil(CHUNK));
        let out = reassemble(&entry, store.as_ref()).await.unwrap();
        assert_eq!(out, data, "round trip failed for {} bytes", size);
    }
}

#[tokio::test]
async fn test_padded_round_trip() {
    let data = common::test_data(2 * CHUNK + 17);
    let options = IngestOptions {
        chunk_size: CHUNK,
        pad: true,
    };
    let ingested = ingest(&data, "padded.bin", &options).unwrap();
    let store = MemoryBlobStore::new();
    let mut sizes = Vec::new();
    for (id, blob) in ingested.blobs {
        sizes.push(blob.len());
        store.put(id, blob).await.unwrap();
    }

    // every blob is the same size, hiding the length of the last chunk
    assert!(sizes.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(ingested.entry.chunks[2].real_size, 17);
    assert_eq!(reassemble(&ingested.entry, &store).await.unwrap(), data);
}

#[tokio::test]
async fn test_tamper_detection() {
    let data = common::test_data(3 * CHUNK);
    let ingested = ingest(&data, "victim.bin", &common::options(CHUNK)).unwrap();
    let blob_len = ingested.blobs[1].1.len();

    for index in [0, 5, 12, blob_len / 2, blob_len - 1] {
        let mut blobs = ingested.blobs.clone();
        blobs[1].1 = common::flip(&blobs[1].1, index);
        let fetcher = common::MapFetcher::new(blobs);

        let err = reassemble(&ingested.entry, &fetcher).await.unwrap_err();
        assert!(
            matches!(err, StorageError::Integrity(id) if id == ingested.entry.chunks[1].blob_id),
            "byte {} flipped gave {:?}",
            index,
            err
        );
    }
}

#[tokio::test]
async fn test_rehashed_tamper_fails_decryption() {
    let data = common::test_data(2 * CHUNK);
    let ingested = ingest(&data, "victim.bin", &common::options(CHUNK)).unwrap();

    // an attacker who also rewrites the entry gets past the hash, not the tag
    let tampered = common::flip(&ingested.blobs[0].1, 20);
    let mut entry = ingested.entry.clone();
    entry.chunks[0].blob_id = BlobId::of(&tampered);
    let mut blobs = ingested.blobs.clone();
    blobs[0] = (entry.chunks[0].blob_id, tampered);
    let fetcher = common::MapFetcher::new(blobs);

    let err = reassemble(&entry, &fetcher).await.unwrap_err();
    assert!(matches!(err, StorageError::Decryption(_)), "{:?}", err);
}

#[tokio::test]
async fn test_missing_blob_aborts_whole_file() {
    let data = common::test_data(2 * CHUNK);
    let ingested = ingest(&data, "partial.bin", &common::options(CHUNK)).unwrap();
    let store = MemoryBlobStore::new();
    let (id, blob) = ingested.blobs[0].clone();
    store.put(id, blob).await.unwrap();

    let missing = ingested.entry.chunks[1].blob_id;
    assert!(matches!(
        reassemble(&ingested.entry, &store).await,
        Err(StorageError::NotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn test_ingest_file_into_fs_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("episode.mp4");
    let data = common::test_data(4 * CHUNK + 3);
    tokio::fs::write(&path, &data).await.unwrap();

    let store = FsBlobStore::open(dir.path().join("blobs"), None).await.unwrap();
    let entry = ingest_file(&path, &store, &common::options(CHUNK)).await.unwrap();
    assert_eq!(entry.name, "episode.mp4");
    assert_eq!(entry.chunks.len(), 5);
    assert_eq!(store.stats().await.unwrap().blob_count, 5);

    // a second handle on the same directory sees everything
    let reopened = FsBlobStore::open(dir.path().join("blobs"), None).await.unwrap();
    assert_eq!(reassemble(&entry, &reopened).await.unwrap(), data);
}
