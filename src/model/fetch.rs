//! Weight file retrieval.
//!
//! Maps (repository id, filename) to a local filesystem path. Downloads go
//! through the Hugging Face hub client, which caches under the standard hub
//! cache directory, so repeat startups reuse the existing file. A configured
//! `local_path` bypasses the hub entirely.

use std::path::PathBuf;

use hf_hub::api::tokio::{ApiBuilder, ApiError};
use thiserror::Error;
use tracing::info;

use crate::config::ModelConfig;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Configured weight file not found: {0}")]
    LocalPathMissing(String),

    #[error("Hub client error: {0}")]
    Hub(#[from] ApiError),
}

/// Resolve the weight file for `config` to a local path.
pub async fn resolve_weights(config: &ModelConfig) -> Result<PathBuf, FetchError> {
    if let Some(path) = &config.local_path {
        if path.exists() {
            info!(path = %path.display(), "Using local weight file");
            return Ok(path.clone());
        }
        return Err(FetchError::LocalPathMissing(path.display().to_string()));
    }

    info!(
        repo_id = config.repo_id,
        filename = config.filename,
        "Resolving weight file from hub"
    );

    let api = ApiBuilder::new().with_progress(false).build()?;
    let path = api.model(config.repo_id.clone()).get(&config.filename).await?;

    info!(path = %path.display(), "Weight file resolved");
    Ok(path)
}
