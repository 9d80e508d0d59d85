use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::{Announce, ChannelError, Hello, Message, Role, SecureChannel, NOT_FOUND};
use crate::storage::BlobId;

use super::Peer;

/// Reason sent when a non-gateway peer receives PUBLISH
pub const NOT_A_GATEWAY: &str = "Not a gateway";

/// Serve one inbound connection until the client hangs up
///
/// Any channel-level failure ends this connection only. Protocol
/// violations are answered with ERROR before the connection is closed.
pub(super) async fn handle_connection<S>(peer: Peer, stream: S) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut channel = SecureChannel::open(stream, Role::Server).await?;

    loop {
        let message = match channel.recv().await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(ChannelError::Protocol(reason)) => {
                let _ = channel.reject(&reason).await;
                return Err(ChannelError::Protocol(reason));
            }
            Err(e) => return Err(e),
        };
        tracing::debug!("handler: received {:?}", message.message_type());

        match message {
            Message::Hello(hello) => {
                if let Err(e) = hello.check_version() {
                    let _ = channel.reject(&e.to_string()).await;
                    return Err(e);
                }
                peer.handle_gossip(&hello.sequences);
                channel
                    .send(&Message::Hello(Hello::new(peer.known_sequences())))
                    .await?;
            }
            Message::Request(blob_id) => match peer.store().get(&blob_id).await {
                Ok(Some(data)) => channel.send_blob(&data).await?,
                Ok(None) => {
                    channel
                        .send(&Message::Error(NOT_FOUND.to_string()))
                        .await?
                }
                Err(e) => {
                    tracing::error!("handler: reading {} failed: {}", blob_id, e);
                    channel
                        .send(&Message::Error(NOT_FOUND.to_string()))
                        .await?
                }
            },
            Message::FindPeers(blob_id) => {
                let peers = lookup_peers(&peer, &blob_id).await;
                channel.send(&Message::Peers(peers)).await?;
            }
            Message::Announce(Announce { blob_id, address }) => {
                if is_host_port(&address) {
                    tracing::debug!("handler: {} announced {}", address, blob_id);
                    peer.pex_insert(blob_id, address);
                    channel.send(&Message::Ok).await?;
                } else {
                    channel
                        .send(&Message::Error(format!("invalid address {}", address)))
                        .await?;
                }
            }
            Message::Publish(manifest) => {
                if !peer.is_gateway() {
                    channel
                        .send(&Message::Error(NOT_A_GATEWAY.to_string()))
                        .await?;
                    continue;
                }
                match peer.relay_manifest(&manifest).await {
                    Ok(_) => channel.send(&Message::Ok).await?,
                    Err(e) => channel.send(&Message::Error(e.to_string())).await?,
                }
            }
            other => {
                let reason = format!("unexpected {:?} from client", other.message_type());
                let _ = channel.reject(&reason).await;
                return Err(ChannelError::Protocol(reason));
            }
        }
    }
}

/// Union of PEX entries and DHT providers for `blob_id`
async fn lookup_peers(peer: &Peer, blob_id: &BlobId) -> Vec<String> {
    let mut peers = peer.pex_lookup(blob_id);
    match peer.dht().find_blob_peers(blob_id).await {
        Ok(found) => {
            for address in found {
                if !peers.contains(&address) {
                    peers.push(address);
                }
            }
        }
        Err(e) => tracing::debug!("lookup_peers: DHT lookup for {} failed: {}", blob_id, e),
    }
    peers
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
