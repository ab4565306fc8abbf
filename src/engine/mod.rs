//! Inference engine: llama.cpp binding surface and the streaming driver.

pub mod generate;
pub mod llama;
