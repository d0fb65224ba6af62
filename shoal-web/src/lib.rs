//! Shoal Web - JSON API Server

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! HTTP edge of the gateway: session management, byte-range streaming,
//! settings, indexer search and the static browser client.

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, ServerError, build_router, run_server};
