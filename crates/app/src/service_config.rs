use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use common::prelude::{ProxyConfig, SecretKey};
use common::storage::{FileEntry, DEFAULT_READAHEAD};

use crate::state::{AppState, StateError, SubscriptionConfig};

#[derive(Debug)]
pub struct Config {
    // peer configuration
    /// address for our peer to listen on,
    ///  if not set then an ephemeral port will be used
    pub node_listen_addr: Option<SocketAddr>,
    /// our node identity,
    ///  if not set then a new secret will be generated
    pub node_secret: Option<SecretKey>,
    /// relay PUBLISH messages from other peers into the DHT
    pub gateway: bool,
    /// `host:port` advertised to peers we download from
    pub external_address: Option<String>,
    pub proxy: Option<ProxyConfig>,
    pub readahead: usize,
    /// peers asked over PEX when the DHT knows no source
    pub bootstrap_peers: Vec<String>,

    // storage configuration
    /// blob store directory, if not set then blobs are kept in memory
    pub blobs_path: Option<PathBuf>,
    pub max_storage: Option<u64>,
    /// shared DHT directory, if not set then an in-process DHT is used
    pub dht_path: Option<PathBuf>,
    pub announce_host: String,

    // channels
    pub subscriptions: Vec<SubscriptionConfig>,
    pub poll_interval: Duration,
    /// file records indexed at startup so they can be streamed
    pub files: Vec<FileEntry>,

    // http server configuration
    /// Port for the HTTP streaming server
    pub http_port: u16,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_listen_addr: None,
            node_secret: None,
            gateway: false,
            external_address: None,
            proxy: None,
            readahead: DEFAULT_READAHEAD,
            bootstrap_peers: Vec::new(),
            blobs_path: None,
            max_storage: None,
            dht_path: None,
            announce_host: common::dht::DEFAULT_ANNOUNCE_HOST.to_string(),
            subscriptions: Vec::new(),
            poll_interval: Duration::from_secs(60),
            files: Vec::new(),
            http_port: 8080,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

impl Config {
    /// Assemble the service configuration for an initialized state directory
    pub fn from_app_state(state: &AppState) -> Result<Self, StateError> {
        let config = &state.config;
        let node_listen_addr = config
            .p2p_port
            .map(|port| SocketAddr::from(([0, 0, 0, 0], port)));

        Ok(Self {
            node_listen_addr,
            node_secret: Some(state.load_key()?),
            gateway: config.gateway,
            external_address: config.external_address.clone(),
            proxy: config.proxy()?,
            readahead: config.readahead,
            bootstrap_peers: config.bootstrap_peers.clone(),
            blobs_path: Some(state.blobs_path.clone()),
            max_storage: config.max_storage,
            dht_path: Some(state.dht_path()),
            announce_host: config.announce_host.clone(),
            subscriptions: config.subscriptions.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            files: state.load_files()?,
            http_port: config.http_port,
            log_level: config.log_level()?,
            log_dir: config.log_dir.clone(),
        })
    }
}
