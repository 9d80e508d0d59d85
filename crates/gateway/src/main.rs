//! swarmcast gateway - a peer that accepts PUBLISH from other peers
//!
//! Publishers without direct DHT access hand their signed manifests to a
//! gateway, which validates them and stores them in the DHT. The gateway
//! otherwise behaves like any node: it seeds, answers PEX and serves the
//! status and streaming routes over HTTP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use common::crypto::SecretKey;
use swarmcast::process::init_logging;
use swarmcast::{start_service, ServiceConfig};

/// swarmcast gateway - relays signed channel manifests into the DHT
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on for HTTP requests
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Port for the peer to listen on (for p2p networking)
    #[arg(long, default_value = "4000")]
    peer_port: u16,

    /// Shared DHT directory (in-process DHT if not set)
    #[arg(long)]
    dht: Option<PathBuf>,

    /// Path to blobs storage directory (in memory if not set)
    #[arg(short, long)]
    blobs: Option<PathBuf>,

    /// PEM identity key, created if missing (ephemeral if not set)
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// `host:port` other peers can reach this gateway on
    #[arg(long)]
    external_address: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Load the gateway identity, generating and persisting one on first run
fn load_or_create_key(path: &Path) -> Result<SecretKey> {
    if path.exists() {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read key {}", path.display()))?;
        return SecretKey::from_pem(&pem)
            .with_context(|| format!("invalid key in {}", path.display()));
    }

    let key = SecretKey::generate();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, key.to_pem())
        .with_context(|| format!("failed to write key {}", path.display()))?;
    Ok(key)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    let _guards = init_logging(log_level, args.log_dir.as_deref());

    tracing::info!("Starting swarmcast gateway");

    let node_secret = args.key.as_deref().map(load_or_create_key).transpose()?;

    let config = ServiceConfig {
        node_listen_addr: Some(SocketAddr::from(([0, 0, 0, 0], args.peer_port))),
        node_secret,
        gateway: true,
        external_address: args.external_address,
        blobs_path: args.blobs,
        dht_path: args.dht,
        http_port: args.port,
        log_level,
        log_dir: args.log_dir,
        ..ServiceConfig::default()
    };

    let (state, handle) = start_service(&config).await;
    tracing::info!(
        "Gateway {} accepting PUBLISH on {}",
        state.peer().public_key(),
        state.peer().local_addr()
    );

    handle.wait().await;
    tracing::info!("Gateway shutdown complete");
    Ok(())
}
