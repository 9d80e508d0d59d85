//! Wire-level tests against running peers

mod common;

use std::sync::Arc;

use ::common::channel::{
    announce_to_peer, connect, download_blob, find_peers_via_pex, publish_via_gateway,
    ChannelError, Hello, Message, Role, SecureChannel, Sequences, PROTOCOL_VERSION,
};
use ::common::crypto::SecretKey;
use ::common::dht::{Dht, MemoryDht};
use ::common::manifest::Manifest;
use ::common::peer::NOT_A_GATEWAY;
use ::common::storage::BlobId;
use ::common::testkit::{TestNetwork, TestPeer};

async fn raw_client(address: &str) -> SecureChannel<::common::channel::BoxedTransport> {
    let stream = connect(address, None).await.unwrap();
    SecureChannel::open(stream, Role::Client).await.unwrap()
}

#[tokio::test]
async fn test_hello_is_answered_with_our_sequences() {
    let mut network = TestNetwork::new();
    let address = network.add_peer("alice").await.unwrap().address();
    let alice = network.peer("alice").unwrap().peer().clone();
    alice.publish(vec![], None, None).await.unwrap();

    let mut channel = raw_client(&address).await;
    channel
        .send(&Message::Hello(Hello::new(Sequences::new())))
        .await
        .unwrap();
    let Some(Message::Hello(reply)) = channel.recv().await.unwrap() else {
        panic!("expected HELLO back");
    };
    assert_eq!(reply.version, PROTOCOL_VERSION);
    assert!(reply.sequences.contains_key(&alice.public_key()));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let mut network = TestNetwork::new();
    let address = network.add_peer("alice").await.unwrap().address();

    let mut channel = raw_client(&address).await;
    let hello = Hello {
        version: PROTOCOL_VERSION + 1,
        sequences: Sequences::new(),
    };
    channel.send(&Message::Hello(hello)).await.unwrap();

    match channel.recv().await.unwrap() {
        Some(Message::Error(reason)) => assert!(reason.contains("incompatible protocol version")),
        other => panic!("expected ERROR, got {:?}", other),
    }
    assert!(matches!(channel.recv().await, Ok(None)));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unexpected_message_is_rejected() {
    let mut network = TestNetwork::new();
    let address = network.add_peer("alice").await.unwrap().address();

    let mut channel = raw_client(&address).await;
    channel.send(&Message::Ok).await.unwrap();
    assert!(matches!(channel.recv().await.unwrap(), Some(Message::Error(_))));
    assert!(matches!(channel.recv().await, Ok(None)));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_request_serves_held_blobs_only() {
    let mut network = TestNetwork::new();
    let alice = network.add_peer("alice").await.unwrap();
    let address = alice.address();
    let entry = alice
        .add_bytes(&common::test_data(5000), "notes.txt")
        .await
        .unwrap();

    let id = entry.chunks[0].blob_id;
    let download = download_blob(&address, &id, &Sequences::new(), None)
        .await
        .unwrap();
    assert_eq!(BlobId::of(&download.data), id);

    let missing = BlobId::of(b"never stored");
    assert!(matches!(
        download_blob(&address, &missing, &Sequences::new(), None).await,
        Err(ChannelError::NotFound(id)) if id == missing
    ));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_find_peers_returns_pex_and_dht_union() {
    let mut network = TestNetwork::new();
    let alice = network.add_peer("alice").await.unwrap();
    let address = alice.address();
    let entry = alice
        .add_bytes(&common::test_data(100), "tiny.txt")
        .await
        .unwrap();
    let id = entry.chunks[0].blob_id;

    announce_to_peer(&address, &id, "10.0.0.9:4000", None)
        .await
        .unwrap();
    let peers = find_peers_via_pex(&address, &id, None).await;
    assert!(peers.contains(&"10.0.0.9:4000".to_string()));
    assert!(peers.contains(&address));
    assert_eq!(peers.len(), 2);

    assert!(matches!(
        announce_to_peer(&address, &id, "not an address", None).await,
        Err(ChannelError::Remote(_))
    ));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publish_requires_gateway() {
    let mut network = TestNetwork::new();
    let peer_address = network.add_peer("alice").await.unwrap().address();
    let gateway_address = network.add_gateway("gateway").await.unwrap().address();

    let key = SecretKey::generate();
    let manifest = Manifest::create(&key, 77, vec![], None).unwrap();

    match publish_via_gateway(&peer_address, &manifest, None).await {
        Err(ChannelError::Remote(reason)) => assert_eq!(reason, NOT_A_GATEWAY),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(network.dht().get_manifest(&key.public()).await.unwrap().is_none());

    publish_via_gateway(&gateway_address, &manifest, None)
        .await
        .unwrap();
    let record = network.dht().get_manifest(&key.public()).await.unwrap().unwrap();
    assert_eq!(record.seq, 77);

    // the gateway enforces the same freshness rule as the DHT
    assert!(matches!(
        publish_via_gateway(&gateway_address, &manifest, None).await,
        Err(ChannelError::Remote(_))
    ));

    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_peer_publishes_through_gateway() {
    let mut network = TestNetwork::new();
    let gateway_address = network.add_gateway("gateway").await.unwrap().address();

    // the publisher has no access to the network's DHT of its own
    let mut publisher = TestPeer::new("publisher", Arc::new(MemoryDht::new()))
        .await
        .unwrap();
    let manifest = publisher
        .peer()
        .publish(vec![], None, Some(&gateway_address))
        .await
        .unwrap();

    let record = network
        .dht()
        .get_manifest(&publisher.peer().public_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.manifest, manifest);

    publisher.shutdown().await.unwrap();
    network.shutdown().await.unwrap();
}
