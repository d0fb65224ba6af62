//! Shoal Search - indexer search for Prowlarr and Jackett

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
//!
//! Queries the two supported metadata services and remaps their result
//! records into one camelCase shape the browser client understands.

pub mod errors;
pub mod providers;
pub mod service;
pub mod types;

pub use errors::SearchError;
pub use providers::{IndexerProvider, JackettProvider, ProwlarrProvider};
pub use service::{Indexer, SearchService};
pub use types::{SearchResult, format_size};

/// Convenience type alias for Results with SearchError.
pub type Result<T> = std::result::Result<T, SearchError>;
