pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "swarmcast")]
#[command(about = "Publish and stream encrypted channels over a peer-to-peer swarm")]
pub struct Args {
    /// Path to the swarmcast state directory (defaults to ~/.swarmcast)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
