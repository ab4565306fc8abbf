//! Streaming generation driver.
//!
//! Bridges the blocking completion iterator onto the async side: the pull
//! loop runs on the blocking pool and forwards fragments over a bounded
//! channel, so a slow consumer backpressures the engine. A cancellation
//! token is checked between fragment pulls; firing it ends the stream early
//! with a `Done` event carrying the counts so far.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::llama::SamplingParams;
use crate::model::cache::ModelHandle;

/// A generation request.
#[derive(Debug)]
pub struct GenerationRequest {
    /// Unique request ID.
    pub request_id: String,

    /// Fully formatted prompt.
    pub prompt: String,

    /// Maximum fragments to generate.
    pub max_tokens: usize,

    /// Stop sequences.
    pub stop: Vec<String>,

    /// Fired to stop the stream between fragment pulls.
    pub cancel: CancellationToken,
}

/// A streamed generation event.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A new fragment of completion text.
    Fragment { text: String },

    /// Generation is complete (exhausted, stopped, or cancelled).
    Done { fragments: usize, chars: usize },

    /// The engine failed mid-stream.
    Error(String),
}

/// Seam between the chat turn loop and the engine; test doubles script
/// arbitrary event sequences through it.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run a generation request, streaming events to the returned receiver.
    async fn generate(&self, request: GenerationRequest) -> mpsc::Receiver<StreamEvent>;
}

/// Production generator backed by the shared model handle.
pub struct LlamaGenerator {
    handle: Arc<ModelHandle>,
}

impl LlamaGenerator {
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Generator for LlamaGenerator {
    async fn generate(&self, request: GenerationRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let handle = Arc::clone(&self.handle);

        tokio::task::spawn_blocking(move || {
            info!(
                request_id = request.request_id,
                max_tokens = request.max_tokens,
                "Starting generation"
            );

            let sampling = SamplingParams {
                max_tokens: request.max_tokens,
                stop: request.stop.clone(),
                echo: false,
            };

            let mut stream = match handle.complete(&request.prompt, &sampling) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(request_id = request.request_id, "Completion failed: {e}");
                    let _ = tx.blocking_send(StreamEvent::Error(e.to_string()));
                    return;
                }
            };

            let mut fragments = 0;
            let mut chars = 0;

            loop {
                if request.cancel.is_cancelled() {
                    debug!(request_id = request.request_id, fragments, "Generation cancelled");
                    break;
                }

                let Some(item) = stream.next() else { break };

                match item {
                    Ok(fragment) => {
                        fragments += 1;
                        chars += fragment.text.len();
                        if tx
                            .blocking_send(StreamEvent::Fragment {
                                text: fragment.text,
                            })
                            .is_err()
                        {
                            // Receiver dropped, stop generating.
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(StreamEvent::Error(e.to_string()));
                        return;
                    }
                }
            }

            let _ = tx.blocking_send(StreamEvent::Done { fragments, chars });

            info!(request_id = request.request_id, fragments, chars, "Generation complete");
        });

        rx
    }
}
