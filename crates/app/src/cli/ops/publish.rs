use clap::Args;

use common::channel::{publish_via_gateway, ChannelError};
use common::crypto::{Secret, SecretError};
use common::dht::{Dht, DhtError};
use common::manifest::{now_millis, Collection, Manifest, ManifestError};
use common::storage::BlobId;
use swarmcast::state::{AppState, StateError};

/// Sign and publish a new manifest for this node's channel
#[derive(Args, Debug, Clone)]
pub struct Publish {
    /// Collection title
    #[arg(long)]
    pub title: String,

    /// Ingested file to include (repeatable)
    #[arg(long = "file")]
    pub files: Vec<BlobId>,

    /// Plain link to include (repeatable)
    #[arg(long = "link")]
    pub links: Vec<String>,

    /// Encrypt the manifest with this read key (hex)
    #[arg(long)]
    pub read_key: Option<String>,

    /// Publish through this gateway instead of the local DHT
    #[arg(long)]
    pub gateway: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid read key: {0}")]
    ReadKey(#[from] SecretError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("dht error: {0}")]
    Dht(#[from] DhtError),
    #[error("gateway error: {0}")]
    Gateway(#[from] ChannelError),
}

/// A publish sequence newer than `current`, tracking wall-clock millis
pub fn next_sequence(current: Option<u64>) -> u64 {
    match current {
        Some(current) => now_millis().max(current + 1),
        None => now_millis(),
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Publish {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let key = state.load_key()?;
        let read_key = self
            .read_key
            .as_deref()
            .map(Secret::from_hex)
            .transpose()?;

        let mut collection = Collection::new(self.title.clone());
        for id in &self.files {
            collection = collection.with_file(state.load_file(id)?);
        }
        for link in &self.links {
            collection = collection.with_link(link.clone());
        }

        let dht = state.open_dht().await?;
        let current = dht
            .get_manifest(&key.public())
            .await?
            .map(|record| record.seq);
        let sequence = next_sequence(current);
        let manifest = Manifest::create(&key, sequence, vec![collection], read_key.as_ref())?;

        let gateway = self
            .gateway
            .clone()
            .or_else(|| state.config.publish_gateway.clone());
        let destination = match gateway {
            Some(gateway) => {
                let proxy = state.config.proxy()?;
                publish_via_gateway(&gateway, &manifest, proxy.as_ref()).await?;
                format!("gateway {}", gateway)
            }
            None => {
                let item = dht.put_manifest(&manifest).await?;
                format!("DHT item {}", item)
            }
        };

        Ok(format!(
            "Published sequence {} for {}\n  - Via: {}\n  - Encrypted: {}",
            sequence,
            key.public(),
            destination,
            manifest.is_encrypted()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sequence_always_increases() {
        let far_future = now_millis() + 1_000_000;
        assert_eq!(next_sequence(Some(far_future)), far_future + 1);
        assert!(next_sequence(Some(1)) > 1);
        assert!(next_sequence(None) > 0);
    }
}
