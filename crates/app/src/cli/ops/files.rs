use clap::Args;

use swarmcast::state::{AppState, StateError};

/// List the files this node has ingested
#[derive(Args, Debug, Clone)]
pub struct Files;

#[async_trait::async_trait]
impl crate::cli::op::Op for Files {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let files = state.load_files()?;
        if files.is_empty() {
            return Ok("No files found".to_string());
        }

        let output = files
            .iter()
            .filter_map(|entry| {
                let id = entry.id()?;
                Some(format!(
                    "{} {} ({} bytes, {} chunks)",
                    id,
                    entry.name,
                    entry.size,
                    entry.chunks.len()
                ))
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(output)
    }
}
