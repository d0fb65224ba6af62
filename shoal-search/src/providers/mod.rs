//! Indexer client implementations.

use async_trait::async_trait;
use serde_json::Value;
use shoal_core::settings::IndexerEndpoint;
use tracing::{debug, warn};
use url::Url;

use crate::errors::SearchError;
use crate::types::SearchResult;

pub mod jackett;
pub mod prowlarr;

pub use jackett::JackettProvider;
pub use prowlarr::ProwlarrProvider;

/// Trait for metadata services that can be searched.
#[async_trait]
pub trait IndexerProvider: Send + Sync + std::fmt::Debug {
    /// Display name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Searches for `query` and returns remapped results.
    ///
    /// # Errors
    /// - `SearchError::NotConfigured` - Host or API key missing
    /// - `SearchError::Network` - Indexer unreachable
    /// - `SearchError::UpstreamStatus` - Indexer returned a non-success status
    /// - `SearchError::Parse` - Response was not the expected JSON
    async fn search(
        &self,
        endpoint: &IndexerEndpoint,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError>;

    /// Calls a cheap authenticated endpoint and returns its JSON body.
    ///
    /// # Errors
    /// Same as [`IndexerProvider::search`].
    async fn test_connection(&self, endpoint: &IndexerEndpoint) -> Result<Value, SearchError>;
}

/// Validates the endpoint and returns its host without a trailing slash.
pub(crate) fn base_url<'a>(
    service: &'static str,
    endpoint: &'a IndexerEndpoint,
) -> Result<&'a str, SearchError> {
    let host = endpoint.host.trim().trim_end_matches('/');
    if host.is_empty() || endpoint.api_key.trim().is_empty() {
        return Err(SearchError::NotConfigured { service });
    }

    Url::parse(host).map_err(|e| SearchError::InvalidHost {
        service,
        reason: e.to_string(),
    })?;
    Ok(host)
}

/// Sends the request and decodes a JSON body, mapping failures to
/// [`SearchError`].
pub(crate) async fn fetch_json(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<Value, SearchError> {
    let response = request.send().await.map_err(|e| {
        warn!(service, error = %e, "Indexer request failed");
        SearchError::Network {
            service,
            reason: e.to_string(),
        }
    })?;

    let status = response.status();
    let body = response.bytes().await.map_err(|e| SearchError::Network {
        service,
        reason: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(SearchError::UpstreamStatus {
            service,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    debug!(service, bytes = body.len(), "Indexer responded");
    serde_json::from_slice(&body).map_err(|e| SearchError::Parse {
        service,
        reason: e.to_string(),
    })
}
