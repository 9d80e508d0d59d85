use std::path::PathBuf;

use clap::Args;

use swarmcast::state::{AppState, StateError};
use swarmcast::{spawn_service, ServiceConfig};

/// Run the node: seed, follow subscriptions and serve HTTP streams
#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Override HTTP server port (default from config)
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Override peer listen port (default from config)
    #[arg(long)]
    pub p2p_port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Serve {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = AppState::load(ctx.config_path.clone())?;
        if let Some(port) = self.p2p_port {
            state.config.p2p_port = Some(port);
        }

        let mut config = ServiceConfig::from_app_state(&state)?;
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if self.log_dir.is_some() {
            config.log_dir = self.log_dir.clone();
        }

        spawn_service(&config).await;
        Ok("node stopped".to_string())
    }
}
