//! Chat domain: transcript, prompt formatting, and the per-turn loop.

pub mod prompt;
pub mod transcript;
pub mod turn;
