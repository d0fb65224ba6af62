//! Search entry point used by the HTTP layer.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use shoal_core::settings::{IndexerEndpoint, SettingsStore};
use tracing::debug;

use crate::errors::SearchError;
use crate::providers::{IndexerProvider, JackettProvider, ProwlarrProvider};
use crate::types::SearchResult;

/// Supported metadata services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexer {
    /// Prowlarr
    Prowlarr,
    /// Jackett
    Jackett,
}

impl fmt::Display for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indexer::Prowlarr => write!(f, "prowlarr"),
            Indexer::Jackett => write!(f, "jackett"),
        }
    }
}

/// Runs searches against the indexer configured in the live settings.
#[derive(Debug, Clone)]
pub struct SearchService {
    settings: SettingsStore,
    prowlarr: Arc<dyn IndexerProvider>,
    jackett: Arc<dyn IndexerProvider>,
}

impl SearchService {
    /// Creates a service whose providers share `client`.
    ///
    /// Indexers are trusted metadata services; pass a direct client so
    /// searches never go through the transfer proxy.
    pub fn new(settings: SettingsStore, client: reqwest::Client) -> Self {
        Self::with_providers(
            settings,
            Arc::new(ProwlarrProvider::new(client.clone())),
            Arc::new(JackettProvider::new(client)),
        )
    }

    /// Creates a service with explicit providers.
    pub fn with_providers(
        settings: SettingsStore,
        prowlarr: Arc<dyn IndexerProvider>,
        jackett: Arc<dyn IndexerProvider>,
    ) -> Self {
        Self {
            settings,
            prowlarr,
            jackett,
        }
    }

    fn provider(&self, indexer: Indexer) -> &dyn IndexerProvider {
        match indexer {
            Indexer::Prowlarr => self.prowlarr.as_ref(),
            Indexer::Jackett => self.jackett.as_ref(),
        }
    }

    /// Searches `indexer` using the stored endpoint settings.
    ///
    /// # Errors
    /// - `SearchError::EmptyQuery` - `query` is blank
    /// - Any error from [`IndexerProvider::search`]
    pub async fn search(
        &self,
        indexer: Indexer,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let endpoint = {
            let settings = self.settings.current();
            match indexer {
                Indexer::Prowlarr => settings.prowlarr(),
                Indexer::Jackett => settings.jackett(),
            }
        };

        debug!(%indexer, query, "Searching indexer");
        self.provider(indexer).search(&endpoint, query).await
    }

    /// Tests connectivity using the endpoint supplied by the caller rather
    /// than the stored settings.
    ///
    /// # Errors
    /// - Any error from [`IndexerProvider::test_connection`]
    pub async fn test_connection(
        &self,
        indexer: Indexer,
        endpoint: &IndexerEndpoint,
    ) -> Result<Value, SearchError> {
        self.provider(indexer).test_connection(endpoint).await
    }
}
