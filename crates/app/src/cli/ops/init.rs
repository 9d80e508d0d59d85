use std::path::PathBuf;

use clap::Args;

use swarmcast::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port for the peer to listen on (ephemeral if not set)
    #[arg(long)]
    pub p2p_port: Option<u16>,

    /// Port for the HTTP streaming server
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,

    /// Relay PUBLISH messages from other peers into the DHT
    #[arg(long)]
    pub gateway: bool,

    /// Shared DHT directory (defaults to <state dir>/dht)
    #[arg(long)]
    pub dht_path: Option<PathBuf>,

    /// Chunk size in bytes for ingested files
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Pad every chunk to the chunk size
    #[arg(long)]
    pub pad: bool,

    /// Blob store capacity in bytes
    #[arg(long)]
    pub max_storage: Option<u64>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            p2p_port: self.p2p_port,
            http_port: self.http_port,
            gateway: self.gateway,
            dht_path: self.dht_path.clone(),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            pad_chunks: self.pad,
            max_storage: self.max_storage,
            ..defaults
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let public_key = state.load_key()?.public();

        Ok(format!(
            "Initialized swarmcast directory at: {}\n  - Channel key: {}\n  - Config: {}\n  - Blobs: {}\n  - DHT: {}",
            state.state_dir.display(),
            public_key,
            state.config_path.display(),
            state.blobs_path.display(),
            state.dht_path().display(),
        ))
    }
}
