use clap::Args;

use common::crypto::{PublicKey, Secret, SecretError};
use swarmcast::state::{AppState, StateError};

/// Follow a channel; takes effect the next time the node starts
#[derive(Args, Debug, Clone)]
pub struct Subscribe {
    /// The channel's public key (hex)
    pub public_key: PublicKey,

    /// Read key (hex) for channels that encrypt their manifests
    #[arg(long)]
    pub read_key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct Unsubscribe {
    /// The channel's public key (hex)
    pub public_key: PublicKey,
}

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid read key: {0}")]
    ReadKey(#[from] SecretError),
    #[error("not subscribed to {0}")]
    NotSubscribed(PublicKey),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Subscribe {
    type Error = SubscribeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let read_key = self
            .read_key
            .as_deref()
            .map(Secret::from_hex)
            .transpose()?;

        let mut state = AppState::load(ctx.config_path.clone())?;
        state.add_subscription(self.public_key, read_key);
        state.save_config()?;

        Ok(format!("Subscribed to {}", self.public_key))
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Unsubscribe {
    type Error = SubscribeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = AppState::load(ctx.config_path.clone())?;
        if !state.remove_subscription(&self.public_key) {
            return Err(SubscribeError::NotSubscribed(self.public_key));
        }
        state.save_config()?;

        Ok(format!("Unsubscribed from {}", self.public_key))
    }
}
