use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dht::Dht;
use crate::peer::{spawn, Peer, PeerBuilder, PeerError};
use crate::storage::{FileEntry, IngestOptions};

/// A running peer with convenience methods for integration testing
pub struct TestPeer {
    /// The name of this peer (for debugging)
    pub name: String,
    /// A clone of the spawned peer; shares all of its state
    peer: Peer,
    shutdown_tx: Option<watch::Sender<()>>,
    peer_task: Option<JoinHandle<Result<(), PeerError>>>,
}

impl TestPeer {
    /// Start a peer on an ephemeral localhost port
    pub async fn new(name: impl Into<String>, dht: Arc<dyn Dht>) -> Result<Self> {
        Self::with_builder(name, PeerBuilder::new().dht(dht)).await
    }

    /// Start a peer from a partially configured builder
    ///
    /// The listen address is always forced to an ephemeral localhost port.
    pub async fn with_builder(name: impl Into<String>, builder: PeerBuilder) -> Result<Self> {
        let name = name.into();
        let peer = builder
            .socket_address("127.0.0.1:0".parse()?)
            .build()
            .await?;
        let handle = peer.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let peer_task = tokio::spawn(spawn(peer, shutdown_rx));
        tracing::debug!("TestPeer {}: started on {}", name, handle.local_address());

        Ok(Self {
            name,
            peer: handle,
            shutdown_tx: Some(shutdown_tx),
            peer_task: Some(peer_task),
        })
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// `host:port` other test peers can dial
    pub fn address(&self) -> String {
        self.peer.local_address()
    }

    /// Ingest and seed `data` with default options
    pub async fn add_bytes(&self, data: &[u8], name: &str) -> Result<FileEntry> {
        Ok(self
            .peer
            .add_file(data, name, &IngestOptions::default())
            .await?)
    }

    /// Signal shutdown and wait for the peer task to finish
    pub async fn shutdown(&mut self) -> Result<()> {
        let shutdown_tx = self
            .shutdown_tx
            .take()
            .ok_or_else(|| anyhow!("peer {} already shut down", self.name))?;
        let _ = shutdown_tx.send(());
        if let Some(task) = self.peer_task.take() {
            task.await??;
        }
        Ok(())
    }
}
