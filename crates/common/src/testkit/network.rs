use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use super::peer::TestPeer;
use crate::dht::MemoryDht;
use crate::peer::PeerBuilder;

/// A set of named peers sharing one in-process DHT
pub struct TestNetwork {
    dht: MemoryDht,
    /// All peers in the network, indexed by name
    peers: HashMap<String, TestPeer>,
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            dht: MemoryDht::new(),
            peers: HashMap::new(),
        }
    }

    pub fn dht(&self) -> &MemoryDht {
        &self.dht
    }

    /// Add a new peer to the network and start it
    pub async fn add_peer(&mut self, name: impl Into<String>) -> Result<&TestPeer> {
        self.add_peer_with(name, PeerBuilder::new()).await
    }

    /// Add a peer that relays PUBLISH into the shared DHT
    pub async fn add_gateway(&mut self, name: impl Into<String>) -> Result<&TestPeer> {
        self.add_peer_with(name, PeerBuilder::new().gateway(true))
            .await
    }

    /// Add a peer from a custom builder; the shared DHT is always attached
    pub async fn add_peer_with(
        &mut self,
        name: impl Into<String>,
        builder: PeerBuilder,
    ) -> Result<&TestPeer> {
        let name = name.into();
        if self.peers.contains_key(&name) {
            return Err(anyhow::anyhow!("Peer '{}' already exists", name));
        }

        let builder = builder.dht(Arc::new(self.dht.clone()));
        let peer = TestPeer::with_builder(name.clone(), builder).await?;
        Ok(self.peers.entry(name).or_insert(peer))
    }

    pub fn peer(&self, name: &str) -> Option<&TestPeer> {
        self.peers.get(name)
    }

    pub fn peer_names(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// Shut every peer down
    pub async fn shutdown(&mut self) -> Result<()> {
        for (_, mut peer) in self.peers.drain() {
            peer.shutdown().await?;
        }
        Ok(())
    }
}
