use std::path::{Path, PathBuf};
use std::{fs, io};

use common::channel::ProxyConfig;
use common::crypto::{PublicKey, Secret, SecretKey};
use common::dht::{DhtError, FsDht, DEFAULT_ANNOUNCE_HOST};
use common::storage::{
    BlobId, FileEntry, FsBlobStore, IngestOptions, StorageError, DEFAULT_CHUNK_SIZE,
    DEFAULT_READAHEAD,
};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "swarmcast";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const BLOBS_DIR_NAME: &str = "blobs";
pub const DHT_DIR_NAME: &str = "dht";
pub const FILES_DIR_NAME: &str = "files";

/// A channel this node follows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub public_key: PublicKey,
    /// Opens the channel if its publisher encrypts manifests
    #[serde(default)]
    pub read_key: Option<Secret>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen port for the peer (P2P) node (optional, defaults to ephemeral)
    #[serde(default)]
    pub p2p_port: Option<u16>,
    /// Port for the HTTP streaming server
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Relay PUBLISH messages from other peers into the DHT
    #[serde(default)]
    pub gateway: bool,
    /// Gateway to publish through instead of writing to the DHT directly
    #[serde(default)]
    pub publish_gateway: Option<String>,
    /// `host:port` other peers can reach us on, sent in ANNOUNCE
    #[serde(default)]
    pub external_address: Option<String>,
    /// SOCKS5 proxy for outbound connections, e.g. `socks5://127.0.0.1:9050`
    #[serde(default)]
    pub proxy: Option<String>,
    /// Peers asked over PEX when the DHT knows no source
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Shared DHT directory (defaults to `<state dir>/dht`)
    #[serde(default)]
    pub dht_path: Option<PathBuf>,
    /// Host recorded for our own DHT announcements
    #[serde(default = "default_announce_host")]
    pub announce_host: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pad every chunk to `chunk_size` on ingest
    #[serde(default)]
    pub pad_chunks: bool,
    /// Chunks prefetched ahead of a streaming reader
    #[serde(default = "default_readahead")]
    pub readahead: usize,
    /// Blob store capacity in bytes (unbounded if not set)
    #[serde(default)]
    pub max_storage: Option<u64>,
    /// Seconds between subscription polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for log files (logs to stdout only if not set)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_announce_host() -> String {
    DEFAULT_ANNOUNCE_HOST.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_readahead() -> usize {
    DEFAULT_READAHEAD
}

fn default_poll_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            p2p_port: None,
            http_port: default_http_port(),
            gateway: false,
            publish_gateway: None,
            external_address: None,
            proxy: None,
            bootstrap_peers: Vec::new(),
            dht_path: None,
            announce_host: default_announce_host(),
            chunk_size: default_chunk_size(),
            pad_chunks: false,
            readahead: default_readahead(),
            max_storage: None,
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
            log_dir: None,
            subscriptions: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            chunk_size: self.chunk_size,
            pad: self.pad_chunks,
        }
    }

    pub fn proxy(&self) -> Result<Option<ProxyConfig>, StateError> {
        self.proxy
            .as_deref()
            .map(|proxy| {
                proxy
                    .parse::<ProxyConfig>()
                    .map_err(|e| StateError::InvalidConfig(format!("proxy {}: {}", proxy, e)))
            })
            .transpose()
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        self.log_level
            .parse()
            .map_err(|_| StateError::InvalidConfig(format!("log level {}", self.log_level)))
    }
}

/// On-disk layout of a node
///
/// ```text
/// <state dir>/
///   config.toml
///   key.pem
///   blobs/
///   dht/
///   files/<file id>.json
/// ```
#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.swarmcast)
    pub state_dir: PathBuf,
    /// Path to the node key PEM file
    pub key_path: PathBuf,
    /// Path to the blobs directory
    pub blobs_path: PathBuf,
    /// Path to the ingested and materialized file records
    pub files_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.swarmcast)
    pub fn state_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    fn at(state_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            key_path: state_dir.join(KEY_FILE_NAME),
            blobs_path: state_dir.join(BLOBS_DIR_NAME),
            files_path: state_dir.join(FILES_DIR_NAME),
            config_path: state_dir.join(CONFIG_FILE_NAME),
            state_dir,
            config,
        }
    }

    /// Initialize a new state directory with a fresh identity
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;
        if state_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let state = Self::at(state_dir, config.unwrap_or_default());
        fs::create_dir_all(&state.state_dir)?;
        fs::create_dir_all(&state.blobs_path)?;
        fs::create_dir_all(&state.files_path)?;
        fs::create_dir_all(state.dht_path())?;

        let key = SecretKey::generate();
        fs::write(&state.key_path, key.to_pem())?;
        state.save_config()?;

        Ok(state)
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;
        if !state_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        let state = Self::at(state_dir, config);
        if !state.key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        fs::create_dir_all(&state.files_path)?;
        Ok(state)
    }

    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }

    /// Load the secret key from the key file
    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))
    }

    pub fn dht_path(&self) -> PathBuf {
        self.config
            .dht_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join(DHT_DIR_NAME))
    }

    pub async fn open_store(&self) -> Result<FsBlobStore, StateError> {
        Ok(FsBlobStore::open(&self.blobs_path, self.config.max_storage).await?)
    }

    pub async fn open_dht(&self) -> Result<FsDht, StateError> {
        Ok(FsDht::open_with_host(self.dht_path(), self.config.announce_host.clone()).await?)
    }

    fn file_path(&self, id: &BlobId) -> PathBuf {
        self.files_path.join(format!("{}.json", id))
    }

    /// Persist a file record so later runs can stream and publish it
    pub fn save_file(&self, entry: &FileEntry) -> Result<Option<BlobId>, StateError> {
        let Some(id) = entry.id() else {
            return Ok(None);
        };
        fs::write(self.file_path(&id), serde_json::to_vec_pretty(entry)?)?;
        Ok(Some(id))
    }

    pub fn load_file(&self, id: &BlobId) -> Result<FileEntry, StateError> {
        match fs::read(self.file_path(id)) {
            Ok(json) => Ok(serde_json::from_slice(&json)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StateError::UnknownFile(*id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Every persisted file record, sorted by name
    pub fn load_files(&self) -> Result<Vec<FileEntry>, StateError> {
        let mut files = Vec::new();
        for dir_entry in fs::read_dir(&self.files_path)? {
            let path = dir_entry?.path();
            if !is_json(&path) {
                continue;
            }
            match serde_json::from_slice::<FileEntry>(&fs::read(&path)?) {
                Ok(entry) => files.push(entry),
                Err(e) => tracing::warn!("AppState: skipping unreadable file record {:?}: {}", path, e),
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Follow `public_key`, replacing any previous read key
    pub fn add_subscription(&mut self, public_key: PublicKey, read_key: Option<Secret>) {
        self.config
            .subscriptions
            .retain(|sub| sub.public_key != public_key);
        self.config.subscriptions.push(SubscriptionConfig {
            public_key,
            read_key,
        });
    }

    /// Returns whether the key was followed
    pub fn remove_subscription(&mut self, public_key: &PublicKey) -> bool {
        let before = self.config.subscriptions.len();
        self.config
            .subscriptions
            .retain(|sub| sub.public_key != *public_key);
        self.config.subscriptions.len() != before
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state directory not initialized. Run 'swarmcast init' first")]
    NotInitialized,

    #[error("state directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no file record for {0}")]
    UnknownFile(BlobId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("dht error: {0}")]
    Dht(#[from] DhtError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
