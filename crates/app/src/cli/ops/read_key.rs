use clap::Args;

use common::crypto::Secret;

/// Generate a read key for encrypting a channel's manifests
#[derive(Args, Debug, Clone)]
pub struct ReadKey;

#[derive(Debug, thiserror::Error)]
pub enum ReadKeyError {
    #[error("read key generation failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for ReadKey {
    type Error = ReadKeyError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(Secret::generate().to_hex())
    }
}
