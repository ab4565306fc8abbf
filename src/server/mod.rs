//! HTTP surface: session store, chat routes, and SSE streaming.

pub mod routes;
pub mod session;
pub mod streaming;
