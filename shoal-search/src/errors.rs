//! Error types for indexer search.

use thiserror::Error;

/// Errors that can occur while talking to an indexer.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Indexer host or API key is missing.
    #[error("{service} host or API key not set")]
    NotConfigured {
        /// Indexer name
        service: &'static str,
    },

    /// Indexer host is not a usable URL.
    #[error("Invalid {service} host: {reason}")]
    InvalidHost {
        /// Indexer name
        service: &'static str,
        /// Why the host was rejected
        reason: String,
    },

    /// Search was requested without a query.
    #[error("No search query provided")]
    EmptyQuery,

    /// Indexer could not be reached.
    #[error("Failed to connect to {service}: {reason}")]
    Network {
        /// Indexer name
        service: &'static str,
        /// Underlying transport error
        reason: String,
    },

    /// Indexer answered with a non-success status.
    #[error("{service} returned status {status}: {body}")]
    UpstreamStatus {
        /// Indexer name
        service: &'static str,
        /// HTTP status code returned
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Indexer response was not the expected JSON.
    #[error("Failed to parse {service} response: {reason}")]
    Parse {
        /// Indexer name
        service: &'static str,
        /// Parser error
        reason: String,
    },
}

impl SearchError {
    /// Checks if this error was caused by the caller's input or settings.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SearchError::NotConfigured { .. }
                | SearchError::InvalidHost { .. }
                | SearchError::EmptyQuery
        )
    }
}
