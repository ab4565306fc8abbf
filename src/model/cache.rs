//! Process-wide model handle cache.
//!
//! The engine handle is expensive to construct (weight resolution, possibly
//! a multi-gigabyte download, then engine initialization), so it is built at
//! most once per process and shared behind an `Arc`. Concurrent first
//! accesses are serialized by `OnceCell`; a failed construction leaves the
//! cell empty. There is no invalidation or reload.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::Config;
use crate::engine::llama::{CompletionStream, LlamaError, LlamaModel, LlamaParams, SamplingParams};
use crate::model::fetch::{self, FetchError};

/// Model construction failure.
///
/// The two kinds halt startup either way, but they call for different
/// operator responses: a fetch failure clears up once connectivity or the
/// hub cache is fixed, while a load failure means the file or the host
/// (engine build, memory) is wrong.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("weight retrieval failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("engine initialization failed: {0}")]
    Load(#[from] LlamaError),
}

impl ModelError {
    /// Whether a plain restart has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::Fetch(_))
    }
}

/// Opaque handle to the loaded model, ready to serve completions.
///
/// Effectively immutable after construction; `complete` takes `&self`, so
/// sessions share it without locking.
#[derive(Debug)]
pub struct ModelHandle {
    model: LlamaModel,
    model_id: String,
}

impl ModelHandle {
    pub fn new(model: LlamaModel, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
        }
    }

    /// Identity reported on the health endpoint.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Context window in tokens.
    pub fn n_ctx(&self) -> u32 {
        self.model.n_ctx()
    }

    /// Weight file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.model.file_size()
    }

    /// Start a blocking streaming completion.
    pub fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
    ) -> Result<CompletionStream, LlamaError> {
        self.model.complete(prompt, sampling)
    }
}

/// Lazy, memoized constructor for the process's single [`ModelHandle`].
#[derive(Default)]
pub struct ModelCache {
    cell: OnceCell<Arc<ModelHandle>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared handle, constructing it on first call.
    ///
    /// Every successful call in the process returns the same `Arc`.
    pub async fn get(&self, config: &Config) -> Result<Arc<ModelHandle>, ModelError> {
        self.cell
            .get_or_try_init(|| load_handle(config))
            .await
            .cloned()
    }

    /// Whether the handle has been constructed.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

async fn load_handle(config: &Config) -> Result<Arc<ModelHandle>, ModelError> {
    let path = fetch::resolve_weights(&config.model).await?;

    let params = LlamaParams {
        n_gpu_layers: config.model.n_gpu_layers,
        n_ctx: config.model.context_size,
        use_mmap: true,
        verbose: config.model.verbose,
    };

    info!(
        path = %path.display(),
        n_gpu_layers = params.n_gpu_layers,
        n_ctx = params.n_ctx,
        "Initializing inference engine"
    );

    let model_id = config.model.filename.clone();
    let model = tokio::task::spawn_blocking(move || LlamaModel::load(&path, params))
        .await
        .map_err(|e| LlamaError::ModelLoadFailed(format!("load task failed: {e}")))??;

    info!(model_id, file_size = model.file_size(), "Model ready");
    Ok(Arc::new(ModelHandle::new(model, model_id)))
}
