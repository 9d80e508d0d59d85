use std::path::PathBuf;

use clap::Args;

use common::storage::{ingest_file, StorageError};
use swarmcast::state::{AppState, StateError};

/// Chunk, encrypt and store a file so it can be published and streamed
#[derive(Args, Debug, Clone)]
pub struct Ingest {
    /// File to ingest
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("ingest failed: {0}")]
    Storage(#[from] StorageError),
    #[error("{0} is empty")]
    Empty(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ingest {
    type Error = IngestError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let store = state.open_store().await?;

        let entry = ingest_file(&self.path, &store, &state.config.ingest_options()).await?;
        let id = state
            .save_file(&entry)?
            .ok_or_else(|| IngestError::Empty(self.path.display().to_string()))?;

        Ok(format!(
            "Ingested {} ({} bytes, {} chunks)\n  - File id: {}",
            entry.name,
            entry.size,
            entry.chunks.len(),
            id
        ))
    }
}
