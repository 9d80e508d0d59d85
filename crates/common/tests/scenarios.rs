//! End-to-end swarm scenarios: publish, subscribe, fetch and stream

mod common;

use std::sync::Arc;
use std::time::Duration;

use ::common::channel::{announce_to_peer, download_blob, Sequences};
use ::common::crypto::Secret;
use ::common::dht::Dht;
use ::common::manifest::{Collection, ManifestError};
use ::common::peer::{PeerBuilder, PeerError};
use ::common::storage::{ingest, BlobStore, IngestOptions, StorageError, DEFAULT_CHUNK_SIZE};
use ::common::testkit::TestNetwork;
use bytes::Bytes;
use futures::TryStreamExt;

/// 3.5 MiB: three full chunks and a half one at the default chunk size
const EPISODE_SIZE: usize = 3 * DEFAULT_CHUNK_SIZE + DEFAULT_CHUNK_SIZE / 2;

#[tokio::test]
async fn test_publish_subscribe_download() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network.add_peer("alice").await.unwrap();
    network.add_peer("bob").await.unwrap();
    let alice = network.peer("alice").unwrap();
    let bob = network.peer("bob").unwrap().peer().clone();

    let data = common::test_data(EPISODE_SIZE);
    let entry = alice.add_bytes(&data, "episode-1.mp4").await.unwrap();
    assert_eq!(entry.chunks.len(), 4);

    let collections = vec![Collection::new("season 1").with_file(entry.clone())];
    let manifest = alice
        .peer()
        .publish(collections, None, None)
        .await
        .unwrap();

    let channel = alice.peer().public_key();
    bob.subscribe(channel, None);
    let view = bob.poll_subscription(&channel).await.unwrap().unwrap();
    assert_eq!(view.sequence, manifest.sequence);
    assert_eq!(bob.subscriptions(), vec![channel]);

    let listed = view.collections[0].files().next().unwrap().clone();
    assert_eq!(listed, entry);
    assert_eq!(bob.download_file(&listed).await.unwrap(), data);

    // bob now seeds every chunk too
    let bob_address = network.peer("bob").unwrap().address();
    for meta in &entry.chunks {
        assert!(bob.is_held(&meta.blob_id));
        let providers = network.dht().find_blob_peers(&meta.blob_id).await.unwrap();
        assert!(providers.contains(&bob_address));
    }

    // polling again without a new publish changes nothing
    assert!(bob.poll_subscription(&channel).await.unwrap().is_none());
    assert_eq!(bob.channel(&channel).unwrap().sequence, manifest.sequence);

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stream_range_over_the_network() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network.add_peer("alice").await.unwrap();
    network.add_peer("bob").await.unwrap();
    let data = common::test_data(EPISODE_SIZE);
    let entry = network
        .peer("alice")
        .unwrap()
        .add_bytes(&data, "episode-2.mp4")
        .await
        .unwrap();
    let bob = network.peer("bob").unwrap().peer().clone();

    // a seek that lands just before the second chunk boundary
    let start = 2 * DEFAULT_CHUNK_SIZE as u64 - 100;
    let end = 2 * DEFAULT_CHUNK_SIZE as u64 + 99;
    let windows: Vec<Bytes> = bob
        .open_stream(entry.clone(), start, end)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(windows.concat(), &data[start as usize..=end as usize]);
    assert!(!bob.is_held(&entry.chunks[0].blob_id));
    assert!(bob.is_held(&entry.chunks[1].blob_id));
    assert!(bob.is_held(&entry.chunks[2].blob_id));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_encrypted_channel_needs_read_key() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network.add_peer("alice").await.unwrap();
    network.add_peer("bob").await.unwrap();
    let alice = network.peer("alice").unwrap().peer().clone();
    let bob = network.peer("bob").unwrap().peer().clone();

    let entry = alice
        .add_file(&common::test_data(2048), "private.txt", &IngestOptions::default())
        .await
        .unwrap();
    let read_key = Secret::generate();
    alice
        .publish(
            vec![Collection::new("members only").with_file(entry)],
            Some(&read_key),
            None,
        )
        .await
        .unwrap();

    let channel = alice.public_key();
    bob.subscribe(channel, None);
    assert!(matches!(
        bob.poll_subscription(&channel).await,
        Err(PeerError::Manifest(ManifestError::MissingReadKey))
    ));
    assert!(bob.channel(&channel).is_none());

    // the failed cycle left nothing behind, so the same sequence is retried
    bob.subscribe(channel, Some(read_key));
    let view = bob.poll_subscription(&channel).await.unwrap().unwrap();
    assert_eq!(view.collections[0].title, "members only");

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_peer_is_blacklisted() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network
        .add_peer_with(
            "mallory",
            PeerBuilder::new().blob_store(Arc::new(common::CorruptStore::default())),
        )
        .await
        .unwrap();
    network.add_peer("alice").await.unwrap();
    network.add_peer("bob").await.unwrap();

    let mallory = network.peer("mallory").unwrap();
    let alice = network.peer("alice").unwrap();
    let bob = network.peer("bob").unwrap().peer().clone();
    let mallory_address = mallory.address();

    let data = common::test_data(10_000);
    let ingested = ingest(&data, "clip.bin", &common::options(4096)).unwrap();
    for (_, blob) in &ingested.blobs {
        mallory.peer().add_blob(blob.clone()).await.unwrap();
    }
    assert_eq!(mallory.peer().reannounce_all().await, 3);

    let id = ingested.entry.chunks[0].blob_id;
    let err = download_blob(&mallory_address, &id, &Sequences::new(), None)
        .await
        .unwrap_err();
    assert!(err.is_integrity_failure());

    assert!(matches!(
        bob.fetch_blob(&id).await,
        Err(PeerError::Exhausted { tried: 1, .. })
    ));
    assert!(bob.is_blacklisted(&mallory_address));
    assert!(!bob.store().has(&id).await.unwrap());

    // an honest source appears; mallory is skipped on the retry
    for (_, blob) in &ingested.blobs {
        alice.peer().add_blob(blob.clone()).await.unwrap();
    }
    alice.peer().reannounce_all().await;
    let candidates = bob.find_candidates(&id).await;
    assert_eq!(candidates, vec![alice.address()]);
    assert_eq!(bob.download_file(&ingested.entry).await.unwrap(), data);

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pex_fallback_when_dht_is_empty() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network.add_peer("alice").await.unwrap();
    network.add_peer("bob").await.unwrap();
    network.add_peer("carol").await.unwrap();
    let alice_address = network.peer("alice").unwrap().address();
    let carol = network.peer("carol").unwrap();
    let carol_address = carol.address();
    let bob = network.peer("bob").unwrap().peer().clone();

    // carol holds the blob but never told the DHT; alice only heard via ANNOUNCE
    let blob = Bytes::from(common::test_data(777));
    let id = carol.peer().add_blob(blob.clone()).await.unwrap();
    announce_to_peer(&alice_address, &id, &carol_address, None)
        .await
        .unwrap();
    assert!(network.dht().find_blob_peers(&id).await.unwrap().is_empty());

    assert!(matches!(
        bob.fetch_blob(&id).await,
        Err(PeerError::NoPeers(missing)) if missing == id
    ));

    bob.add_connected_peer(&alice_address);
    assert_eq!(bob.fetch_blob(&id).await.unwrap(), blob);
    assert!(bob.connected_peers().contains(&carol_address));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_gossip_triggers_poll() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network.add_peer("alice").await.unwrap();
    network.add_peer("bob").await.unwrap();
    let alice = network.peer("alice").unwrap().peer().clone();
    let bob = network.peer("bob").unwrap().peer().clone();

    let entry = alice
        .add_file(&common::test_data(500), "teaser.txt", &IngestOptions::default())
        .await
        .unwrap();
    let manifest = alice
        .publish(vec![Collection::new("news").with_file(entry.clone())], None, None)
        .await
        .unwrap();

    let channel = alice.public_key();
    bob.subscribe(channel, None);
    assert_eq!(bob.subscriptions().len(), 1);

    // fetching anything from alice carries her sequences back in HELLO
    bob.fetch_blob(&entry.chunks[0].blob_id).await.unwrap();

    let view = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(view) = bob.channel(&channel) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("gossip never triggered a poll");
    assert_eq!(view.sequence, manifest.sequence);
    assert!(bob.file(&entry.id().unwrap()).is_some());

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_forgets_channel() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network.add_peer("alice").await.unwrap();
    network.add_peer("bob").await.unwrap();
    let alice = network.peer("alice").unwrap().peer().clone();
    let bob = network.peer("bob").unwrap().peer().clone();

    alice.publish(vec![], None, None).await.unwrap();
    let channel = alice.public_key();
    bob.subscribe(channel, None);
    bob.poll_subscription(&channel).await.unwrap().unwrap();
    assert!(bob.known_sequences().contains_key(&channel));

    bob.unsubscribe(&channel);
    assert!(bob.subscriptions().is_empty());
    assert!(bob.channel(&channel).is_none());
    assert!(!bob.known_sequences().contains_key(&channel));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_signed_entry_with_bogus_sizes_is_rejected() {
    common::init_tracing();
    let mut network = TestNetwork::new();
    network.add_peer("mallory").await.unwrap();
    network.add_peer("bob").await.unwrap();
    let mallory = network.peer("mallory").unwrap();
    let bob = network.peer("bob").unwrap().peer().clone();

    let mut entry = mallory.add_bytes(b"0123456789", "bait.mp4").await.unwrap();
    entry.size = u64::MAX;
    mallory
        .peer()
        .publish(vec![Collection::new("bait").with_file(entry)], None, None)
        .await
        .unwrap();

    let channel = mallory.peer().public_key();
    bob.subscribe(channel, None);
    let view = bob.poll_subscription(&channel).await.unwrap().unwrap();
    let listed = view.collections[0].files().next().unwrap().clone();
    let id = listed.id().unwrap();
    assert!(bob.file(&id).is_none());

    assert!(matches!(
        bob.download_file(&listed).await,
        Err(PeerError::Storage(StorageError::Malformed(_)))
    ));
    assert!(matches!(
        bob.open_stream(listed, 50, 60),
        Err(StorageError::Malformed(_))
    ));
    assert!(!bob.is_held(&id));

    network.shutdown().await.unwrap();
}
