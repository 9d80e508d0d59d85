use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;

use crate::channel::{ChannelError, ProxyConfig, Sequences};
use crate::crypto::{PublicKey, Secret, SecretKey};
use crate::dht::{Dht, DhtError, MemoryDht};
use crate::manifest::{ChannelView, ManifestError, SubscriptionTracker};
use crate::storage::{BlobId, BlobStore, FileEntry, MemoryBlobStore, StorageError, DEFAULT_READAHEAD};

use super::blacklist::Blacklist;
use super::jobs::{JobDispatcher, JobReceiver};
use super::pex::PexCache;

#[derive(Debug, Default)]
pub struct PeerBuilder {
    /// the socket addr to listen on
    ///  if not set, an ephemeral port on all interfaces is used
    socket_address: Option<SocketAddr>,
    /// the identity of the peer, used to sign published manifests
    secret_key: Option<SecretKey>,
    store: Option<Arc<dyn BlobStore>>,
    dht: Option<Arc<dyn Dht>>,
    /// whether to relay PUBLISH requests into the DHT
    gateway: bool,
    /// `host:port` other peers can reach us on, sent with ANNOUNCE
    external_address: Option<String>,
    proxy: Option<ProxyConfig>,
    readahead: Option<usize>,
    blacklist: Option<Blacklist>,
}

impl PeerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket_address(mut self, socket_addr: SocketAddr) -> Self {
        self.socket_address = Some(socket_addr);
        self
    }

    pub fn secret_key(mut self, secret_key: SecretKey) -> Self {
        self.secret_key = Some(secret_key);
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dht(mut self, dht: Arc<dyn Dht>) -> Self {
        self.dht = Some(dht);
        self
    }

    pub fn gateway(mut self, gateway: bool) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn external_address(mut self, address: impl Into<String>) -> Self {
        self.external_address = Some(address.into());
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn readahead(mut self, readahead: usize) -> Self {
        self.readahead = Some(readahead);
        self
    }

    pub fn blacklist(mut self, blacklist: Blacklist) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    /// Bind the listener and assemble the peer
    ///
    /// Blobs already in the store are marked held, so they are announced
    /// on the first re-announce pass.
    pub async fn build(self) -> Result<Peer, PeerError> {
        let socket_addr = self
            .socket_address
            .unwrap_or_else(|| SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0));
        let secret_key = self.secret_key.unwrap_or_else(SecretKey::generate);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryBlobStore::new()));
        let dht = self.dht.unwrap_or_else(|| Arc::new(MemoryDht::new()));

        let listener = TcpListener::bind(socket_addr).await?;
        let local_addr = listener.local_addr()?;

        let held: HashSet<BlobId> = store
            .list()
            .await?
            .into_iter()
            .map(|info| info.blob_id)
            .collect();

        let (jobs, job_receiver) = JobDispatcher::new();

        tracing::info!(
            "PEER: {} bound to {} (gateway: {}, holding {} blobs)",
            secret_key.public(),
            local_addr,
            self.gateway,
            held.len()
        );

        Ok(Peer {
            secret_key,
            local_addr,
            store,
            dht,
            gateway: self.gateway,
            external_address: self.external_address,
            proxy: self.proxy,
            readahead: self.readahead.unwrap_or(DEFAULT_READAHEAD),
            state: Arc::new(PeerState {
                pex: RwLock::new(PexCache::default()),
                blacklist: RwLock::new(self.blacklist.unwrap_or_default()),
                subscriptions: RwLock::new(SubscriptionTracker::new()),
                read_keys: RwLock::default(),
                channels: RwLock::default(),
                published: RwLock::default(),
                held: RwLock::new(held),
                connected: RwLock::default(),
                files: RwLock::default(),
            }),
            jobs,
            job_receiver: Some(job_receiver),
            listener: Some(listener),
        })
    }
}

/// Mutable state shared by every clone of a [`Peer`]
///
/// Locks are only ever held for a single synchronous step, never across an
/// `.await`.
#[derive(Debug)]
pub(super) struct PeerState {
    pub(super) pex: RwLock<PexCache>,
    pub(super) blacklist: RwLock<Blacklist>,
    pub(super) subscriptions: RwLock<SubscriptionTracker>,
    pub(super) read_keys: RwLock<HashMap<PublicKey, Secret>>,
    /// latest materialized view per subscribed channel
    pub(super) channels: RwLock<HashMap<PublicKey, ChannelView>>,
    /// sequence of the last manifest we published ourselves
    pub(super) published: RwLock<Option<u64>>,
    pub(super) held: RwLock<HashSet<BlobId>>,
    /// peers we have successfully downloaded from, in first-seen order
    pub(super) connected: RwLock<Vec<String>>,
    /// files this node knows about, keyed by their first chunk's blob id
    pub(super) files: RwLock<HashMap<BlobId, FileEntry>>,
}

/// A node in the swarm: serves blobs, fetches them, publishes and follows
/// channels
#[derive(Debug)]
pub struct Peer {
    pub(super) secret_key: SecretKey,
    pub(super) local_addr: SocketAddr,
    pub(super) store: Arc<dyn BlobStore>,
    pub(super) dht: Arc<dyn Dht>,
    pub(super) gateway: bool,
    pub(super) external_address: Option<String>,
    pub(super) proxy: Option<ProxyConfig>,
    pub(super) readahead: usize,
    pub(super) state: Arc<PeerState>,
    pub(super) jobs: JobDispatcher,
    job_receiver: Option<JobReceiver>,
    listener: Option<TcpListener>,
}

impl Clone for Peer {
    fn clone(&self) -> Self {
        Self {
            secret_key: self.secret_key.clone(),
            local_addr: self.local_addr,
            store: self.store.clone(),
            dht: self.dht.clone(),
            gateway: self.gateway,
            external_address: self.external_address.clone(),
            proxy: self.proxy.clone(),
            readahead: self.readahead,
            state: self.state.clone(),
            jobs: self.jobs.clone(),
            // only the original peer can run the worker and accept loop
            job_receiver: None,
            listener: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("dht error: {0}")]
    Dht(#[from] DhtError),
    #[error("no peers known for blob {0}")]
    NoPeers(BlobId),
    #[error("all {tried} candidate peers failed for blob {blob_id}")]
    Exhausted { blob_id: BlobId, tried: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer error: {0}")]
    Default(#[from] anyhow::Error),
}

impl Peer {
    pub fn secret(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret_key.public()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Loopback `host:port` for this peer, as the DHT records it by default
    pub fn local_address(&self) -> String {
        format!("{}:{}", Ipv4Addr::LOCALHOST, self.port())
    }

    pub fn external_address(&self) -> Option<&str> {
        self.external_address.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn dht(&self) -> &Arc<dyn Dht> {
        &self.dht
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn is_gateway(&self) -> bool {
        self.gateway
    }

    pub fn readahead(&self) -> usize {
        self.readahead
    }

    pub fn jobs(&self) -> &JobDispatcher {
        &self.jobs
    }

    /// Extract the job receiver (internal use by peer::spawn)
    ///
    /// This can only be called once; clones never carry it.
    pub(super) fn take_job_receiver(&mut self) -> Option<JobReceiver> {
        let receiver = self.job_receiver.take();
        if receiver.is_none() {
            tracing::warn!("PEER: job receiver already taken - likely called on a clone");
        }
        receiver
    }

    pub(super) fn take_listener(&mut self) -> Option<TcpListener> {
        self.listener.take()
    }

    /// Highest sequence known per channel, as sent in HELLO
    ///
    /// Covers every subscription plus our own channel once we have published.
    pub fn known_sequences(&self) -> Sequences {
        let mut sequences = self.state.subscriptions.read().sequences();
        if let Some(sequence) = *self.state.published.read() {
            sequences.insert(self.public_key(), sequence);
        }
        sequences
    }

    pub fn is_held(&self, blob_id: &BlobId) -> bool {
        self.state.held.read().contains(blob_id)
    }

    pub fn held(&self) -> Vec<BlobId> {
        self.state.held.read().iter().copied().collect()
    }

    pub(super) fn mark_held(&self, blob_id: BlobId) {
        self.state.held.write().insert(blob_id);
    }

    /// Peers we have downloaded from, used as PEX fallbacks
    pub fn connected_peers(&self) -> Vec<String> {
        self.state.connected.read().clone()
    }

    /// Remember `address` as a reachable peer
    pub fn add_connected_peer(&self, address: &str) {
        let mut connected = self.state.connected.write();
        if !connected.iter().any(|known| known == address) {
            connected.push(address.to_string());
        }
    }

    pub fn is_blacklisted(&self, address: &str) -> bool {
        self.state.blacklist.read().contains(address)
    }

    pub fn pex_insert(&self, blob_id: BlobId, address: String) {
        self.state.pex.write().insert(blob_id, address);
    }

    pub fn pex_lookup(&self, blob_id: &BlobId) -> Vec<String> {
        self.state.pex.read().get(blob_id)
    }

    /// Record a file in the local index, making it streamable
    ///
    /// Entries whose chunks do not add up to their size are dropped.
    pub fn index_file(&self, entry: FileEntry) {
        if let Err(e) = entry.validate() {
            tracing::warn!("PEER: not indexing {}: {}", entry.name, e);
            return;
        }
        if let Some(id) = entry.id() {
            tracing::debug!("PEER: indexing {} as {}", entry.name, id);
            self.state.files.write().insert(id, entry);
        }
    }

    pub fn file(&self, id: &BlobId) -> Option<FileEntry> {
        self.state.files.read().get(id).cloned()
    }

    /// Every indexed file, sorted by name
    pub fn files(&self) -> Vec<FileEntry> {
        let mut files: Vec<FileEntry> = self.state.files.read().values().cloned().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    /// Latest materialized view of a subscribed channel
    pub fn channel(&self, public_key: &PublicKey) -> Option<ChannelView> {
        self.state.channels.read().get(public_key).cloned()
    }
}
