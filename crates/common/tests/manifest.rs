//! Integration tests for manifest signing and the DHT record rules

mod common;

use ::common::crypto::{Secret, SecretKey};
use ::common::dht::{item_hash, Dht, DhtError, FsDht, MemoryDht};
use ::common::manifest::{Collection, Manifest, ManifestError, SubscriptionState, SubscriptionTracker};
use ::common::storage::ingest;
use tempfile::TempDir;

fn signed(key: &SecretKey, sequence: u64, read_key: Option<&Secret>) -> Manifest {
    let ingested = ingest(&common::test_data(300), "clip.webm", &common::options(128)).unwrap();
    let collections = vec![Collection::new("clips").with_file(ingested.entry)];
    Manifest::create(key, sequence, collections, read_key).unwrap()
}

#[test]
fn test_any_signature_bit_flip_is_rejected() {
    let key = SecretKey::generate();
    let manifest = signed(&key, 5, None);
    assert!(manifest.validate().is_ok());

    for byte in 0..manifest.signature.len() {
        for bit in [0, 3, 7] {
            let mut tampered = manifest.clone();
            tampered.signature[byte] ^= 1 << bit;
            assert!(
                tampered.validate().is_err(),
                "flip of bit {} in byte {} went unnoticed",
                bit,
                byte
            );
        }
    }
}

#[test]
fn test_sealed_manifest_validates_without_read_key() {
    let key = SecretKey::generate();
    let read_key = Secret::generate();
    let manifest = signed(&key, 8, Some(&read_key));

    // provenance is checkable by anyone; content is not
    let parsed = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
    assert!(parsed.validate().is_ok());
    assert!(matches!(parsed.decrypt(None), Err(ManifestError::MissingReadKey)));
    let view = parsed.decrypt(Some(&read_key)).unwrap();
    assert_eq!(view.collections[0].files().count(), 1);
}

#[tokio::test]
async fn test_dht_keeps_highest_sequence() {
    let dht = MemoryDht::new();
    let key = SecretKey::generate();

    dht.put_manifest(&signed(&key, 100, None)).await.unwrap();
    for stale in [1, 99, 100] {
        assert!(matches!(
            dht.put_manifest(&signed(&key, stale, None)).await,
            Err(DhtError::Stale { current: 100, .. })
        ));
    }
    dht.put_manifest(&signed(&key, 101, None)).await.unwrap();
    let record = dht.get_manifest(&key.public()).await.unwrap().unwrap();
    assert_eq!(record.seq, 101);
}

#[tokio::test]
async fn test_dht_rejects_forged_manifest() {
    let dht = MemoryDht::new();
    let key = SecretKey::generate();
    let mut forged = signed(&key, 3, None);
    forged.public_key = SecretKey::generate().public();

    assert!(matches!(
        dht.put_manifest(&forged).await,
        Err(DhtError::InvalidManifest(_))
    ));
    assert!(dht.get_manifest(&forged.public_key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fs_dht_is_shared_between_handles() {
    let dir = TempDir::new().unwrap();
    let writer = FsDht::open(dir.path()).await.unwrap();
    let reader = FsDht::open(dir.path()).await.unwrap();
    let key = SecretKey::generate();

    let manifest = signed(&key, 12, None);
    let hash = writer.put_manifest(&manifest).await.unwrap();
    assert_eq!(hash, item_hash(&key.public()));

    let record = reader.get_manifest(&key.public()).await.unwrap().unwrap();
    assert_eq!(record.manifest, manifest);
    assert!(record.manifest.validate().is_ok());

    let blob_id = manifest.decrypt(None).unwrap().collections[0]
        .files()
        .next()
        .unwrap()
        .chunks[0]
        .blob_id;
    writer.announce_blob(&blob_id, 4100).await.unwrap();
    writer.announce_blob(&blob_id, 4100).await.unwrap();
    assert_eq!(
        reader.find_blob_peers(&blob_id).await.unwrap(),
        vec!["127.0.0.1:4100".to_string()]
    );
}

#[test]
fn test_subscription_never_regresses() {
    let key = SecretKey::generate().public();
    let mut tracker = SubscriptionTracker::new();
    tracker.subscribe(key);

    tracker.observe(key, 10).unwrap();
    tracker.verified(&key, 10);
    tracker.materialized(&key, 10);
    assert_eq!(tracker.state(&key), SubscriptionState::Materialized(10));

    assert!(matches!(
        tracker.observe(key, 10),
        Err(ManifestError::Stale {
            current: 10,
            offered: 10
        })
    ));
    assert!(tracker.observe(key, 9).is_err());

    // a newer manifest that fails validation leaves the old one in place
    tracker.observe(key, 11).unwrap();
    tracker.abort(&key, 11);
    assert_eq!(tracker.state(&key), SubscriptionState::Materialized(10));
    assert_eq!(tracker.sequences().get(&key), Some(&10));
}
