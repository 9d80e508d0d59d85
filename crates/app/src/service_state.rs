use std::sync::Arc;
use std::time::Duration;

use common::dht::{Dht, DhtError, FsDht, MemoryDht};
use common::peer::{Peer, PeerBuilder, PeerError};
use common::storage::{BlobStore, FsBlobStore, MemoryBlobStore, StorageError};

use super::service_config::Config;

/// Main service state - shared by the HTTP handlers and background tasks
#[derive(Clone)]
pub struct State {
    peer: Peer,
    poll_interval: Duration,
}

impl State {
    /// Open the stores and bind the peer
    ///
    /// Returns the peer that must be handed to [`common::peer::spawn`]; the
    /// state keeps a clone of it.
    pub async fn from_config(config: &Config) -> Result<(Self, Peer), StateSetupError> {
        // 1. Setup blob store
        let store: Arc<dyn BlobStore> = match &config.blobs_path {
            Some(path) => {
                tracing::debug!("ServiceState::from_config - opening blob store at {:?}", path);
                Arc::new(FsBlobStore::open(path, config.max_storage).await?)
            }
            None => Arc::new(MemoryBlobStore::new()),
        };

        // 2. Setup DHT
        let dht: Arc<dyn Dht> = match &config.dht_path {
            Some(path) => {
                Arc::new(FsDht::open_with_host(path, config.announce_host.clone()).await?)
            }
            None => Arc::new(MemoryDht::new()),
        };

        // 3. Build the peer
        let mut builder = PeerBuilder::new()
            .blob_store(store)
            .dht(dht)
            .gateway(config.gateway)
            .readahead(config.readahead);
        if let Some(addr) = config.node_listen_addr {
            builder = builder.socket_address(addr);
        }
        if let Some(secret) = &config.node_secret {
            builder = builder.secret_key(secret.clone());
        }
        if let Some(address) = &config.external_address {
            builder = builder.external_address(address.clone());
        }
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(proxy.clone());
        }
        let peer = builder.build().await?;

        tracing::info!("Node id: {}", peer.public_key());
        tracing::info!("Peer listening on: {}", peer.local_addr());

        // 4. Restore what this node knows about
        for entry in &config.files {
            peer.index_file(entry.clone());
        }
        for subscription in &config.subscriptions {
            peer.subscribe(subscription.public_key, subscription.read_key.clone());
        }
        for address in &config.bootstrap_peers {
            peer.add_connected_peer(address);
        }
        // the DHT only learns our port once we are bound
        peer.reannounce_all().await;

        let state = Self {
            peer: peer.clone(),
            poll_interval: config.poll_interval,
        };
        Ok((state, peer))
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Queue a poll for every subscribed channel
    pub fn poll_subscriptions(&self) -> usize {
        let mut queued = 0;
        for public_key in self.peer.subscriptions() {
            match self.peer.jobs().dispatch_poll(public_key) {
                Ok(()) => queued += 1,
                Err(e) => tracing::warn!("failed to queue poll for {}: {}", public_key, e),
            }
        }
        queued
    }
}

impl AsRef<Peer> for State {
    fn as_ref(&self) -> &Peer {
        &self.peer
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Blob store error: {0}")]
    BlobStore(#[from] StorageError),
    #[error("DHT error: {0}")]
    Dht(#[from] DhtError),
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),
}
