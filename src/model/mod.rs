//! Model lifecycle: weight retrieval and the process-wide handle cache.

pub mod cache;
pub mod fetch;
