//! mamba-chat: single-page streaming chat for a local GGUF model.
//!
//! On startup the weight file is resolved (downloaded from the Hugging Face
//! hub on first run, reused from the hub cache afterwards) and the inference
//! engine is initialized exactly once. The binary then serves an embedded
//! chat page; each submission runs one chat turn whose generated fragments
//! are streamed back to the browser over SSE.

pub mod chat;
pub mod config;
pub mod engine;
pub mod model;
pub mod server;
