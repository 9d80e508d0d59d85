use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::manifest::Manifest;
use crate::storage::BlobId;

use super::handshake::Role;
use super::messages::{Announce, Hello, Message, Sequences, NOT_FOUND};
use super::secure::SecureChannel;
use super::transport::{connect, BoxedTransport, ProxyConfig};
use super::{
    ChannelError, ANNOUNCE_TIMEOUT, DOWNLOAD_TIMEOUT, MAX_BLOB_SIZE, PEX_TIMEOUT, PUBLISH_TIMEOUT,
};

/// A verified blob along with the sequences the serving peer gossiped
#[derive(Debug, Clone)]
pub struct BlobDownload {
    pub data: Bytes,
    pub remote_sequences: Sequences,
}

async fn with_timeout<T>(
    limit: Duration,
    future: impl Future<Output = Result<T, ChannelError>>,
) -> Result<T, ChannelError> {
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout(limit)),
    }
}

async fn open_client(
    peer: &str,
    proxy: Option<&ProxyConfig>,
) -> Result<SecureChannel<BoxedTransport>, ChannelError> {
    let stream = connect(peer, proxy).await?;
    SecureChannel::open(stream, Role::Client).await
}

async fn check_hello(
    channel: &mut SecureChannel<BoxedTransport>,
    hello: &Hello,
) -> Result<(), ChannelError> {
    if let Err(e) = hello.check_version() {
        let _ = channel.reject(&e.to_string()).await;
        return Err(e);
    }
    Ok(())
}

/// Download one blob from `peer` and verify it hashes to `blob_id`
///
/// The whole exchange is capped at [`DOWNLOAD_TIMEOUT`]. The hash is checked
/// once after the terminating empty DATA frame; no bytes are returned before
/// that check passes.
pub async fn download_blob(
    peer: &str,
    blob_id: &BlobId,
    sequences: &Sequences,
    proxy: Option<&ProxyConfig>,
) -> Result<BlobDownload, ChannelError> {
    with_timeout(DOWNLOAD_TIMEOUT, async {
        let mut channel = open_client(peer, proxy).await?;
        channel
            .send(&Message::Hello(Hello::new(sequences.clone())))
            .await?;
        channel.send(&Message::Request(*blob_id)).await?;
        tracing::debug!("download_blob: requested {} from {}", blob_id, peer);

        let mut data = BytesMut::new();
        let mut remote_sequences = Sequences::new();
        loop {
            match channel.recv().await? {
                Some(Message::Hello(hello)) => {
                    check_hello(&mut channel, &hello).await?;
                    remote_sequences = hello.sequences;
                }
                Some(Message::Data(chunk)) if chunk.is_empty() => break,
                Some(Message::Data(chunk)) => {
                    if data.len() + chunk.len() > MAX_BLOB_SIZE {
                        let _ = channel.close().await;
                        return Err(ChannelError::Protocol(format!(
                            "blob {} exceeds {} bytes",
                            blob_id, MAX_BLOB_SIZE
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }
                Some(Message::Error(reason)) if reason == NOT_FOUND => {
                    return Err(ChannelError::NotFound(*blob_id))
                }
                Some(Message::Error(reason)) => return Err(ChannelError::Remote(reason)),
                Some(other) => {
                    let _ = channel.close().await;
                    return Err(ChannelError::Protocol(format!(
                        "unexpected {:?} while downloading",
                        other.message_type()
                    )));
                }
                None => {
                    return Err(ChannelError::Connection(format!(
                        "{} closed before blob {} completed",
                        peer, blob_id
                    )))
                }
            }
        }
        let _ = channel.close().await;

        let data = data.freeze();
        let actual = BlobId::of(&data);
        if actual != *blob_id {
            tracing::warn!(
                "download_blob: {} served {} bytes hashing to {} for {}",
                peer,
                data.len(),
                actual,
                blob_id
            );
            return Err(ChannelError::Integrity {
                expected: *blob_id,
                actual,
            });
        }
        Ok(BlobDownload {
            data,
            remote_sequences,
        })
    })
    .await
}

/// Send a single request and wait for the first reply that is not HELLO
async fn request(
    peer: &str,
    proxy: Option<&ProxyConfig>,
    message: Message,
) -> Result<Message, ChannelError> {
    let mut channel = open_client(peer, proxy).await?;
    channel.send(&message).await?;
    loop {
        match channel.recv().await? {
            Some(Message::Hello(hello)) => check_hello(&mut channel, &hello).await?,
            Some(reply) => {
                let _ = channel.close().await;
                return Ok(reply);
            }
            None => {
                return Err(ChannelError::Connection(format!(
                    "{} closed without replying",
                    peer
                )))
            }
        }
    }
}

fn expect_ok(reply: Message) -> Result<(), ChannelError> {
    match reply {
        Message::Ok => Ok(()),
        Message::Error(reason) => Err(ChannelError::Remote(reason)),
        other => Err(ChannelError::Protocol(format!(
            "expected OK, got {:?}",
            other.message_type()
        ))),
    }
}

/// Ask `peer` who else holds `blob_id`
///
/// Capped at [`PEX_TIMEOUT`]; any failure degrades to an empty list.
pub async fn find_peers_via_pex(
    peer: &str,
    blob_id: &BlobId,
    proxy: Option<&ProxyConfig>,
) -> Vec<String> {
    let reply = with_timeout(
        PEX_TIMEOUT,
        request(peer, proxy, Message::FindPeers(*blob_id)),
    )
    .await;
    match reply {
        Ok(Message::Peers(peers)) => peers,
        Ok(other) => {
            tracing::debug!(
                "find_peers_via_pex: {} replied {:?}",
                peer,
                other.message_type()
            );
            Vec::new()
        }
        Err(e) => {
            tracing::debug!("find_peers_via_pex: {} failed: {}", peer, e);
            Vec::new()
        }
    }
}

/// Ask a gateway to store `manifest` in the DHT on our behalf
pub async fn publish_via_gateway(
    gateway: &str,
    manifest: &Manifest,
    proxy: Option<&ProxyConfig>,
) -> Result<(), ChannelError> {
    let reply = with_timeout(
        PUBLISH_TIMEOUT,
        request(gateway, proxy, Message::Publish(Box::new(manifest.clone()))),
    )
    .await?;
    expect_ok(reply)
}

/// Register `address` as a source of `blob_id` in `peer`'s PEX cache
pub async fn announce_to_peer(
    peer: &str,
    blob_id: &BlobId,
    address: &str,
    proxy: Option<&ProxyConfig>,
) -> Result<(), ChannelError> {
    let announce = Announce {
        blob_id: *blob_id,
        address: address.to_string(),
    };
    let reply = with_timeout(
        ANNOUNCE_TIMEOUT,
        request(peer, proxy, Message::Announce(announce)),
    )
    .await?;
    expect_ok(reply)
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one connection and answer its REQUEST with `serve`
    async fn one_shot_server(serve: Option<Bytes>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut channel = SecureChannel::open(stream, Role::Server).await.unwrap();
            while let Ok(Some(message)) = channel.recv().await {
                match message {
                    Message::Hello(_) => {
                        channel
                            .send(&Message::Hello(Hello::new(Sequences::new())))
                            .await
                            .unwrap();
                    }
                    Message::Request(_) => {
                        match &serve {
                            Some(data) => channel.send_blob(data).await.unwrap(),
                            None => channel
                                .send(&Message::Error(NOT_FOUND.to_string()))
                                .await
                                .unwrap(),
                        }
                        break;
                    }
                    _ => break,
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_download_verifies_hash() {
        let blob = Bytes::from_static(b"an encrypted chunk");
        let id = BlobId::of(&blob);
        let peer = one_shot_server(Some(blob.clone())).await;
        let download = download_blob(&peer, &id, &Sequences::new(), None)
            .await
            .unwrap();
        assert_eq!(download.data, blob);

        let peer = one_shot_server(Some(Bytes::from_static(b"something else"))).await;
        let err = download_blob(&peer, &id, &Sequences::new(), None)
            .await
            .unwrap_err();
        assert!(err.is_integrity_failure());
    }

    #[tokio::test]
    async fn test_download_not_found() {
        let peer = one_shot_server(None).await;
        let id = BlobId::of(b"missing");
        assert!(matches!(
            download_blob(&peer, &id, &Sequences::new(), None).await,
            Err(ChannelError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_pex_degrades_to_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(find_peers_via_pex(&addr, &BlobId::of(b"x"), None)
            .await
            .is_empty());
    }
}
