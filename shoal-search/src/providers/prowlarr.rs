//! Prowlarr indexer client.

use async_trait::async_trait;
use serde_json::Value;
use shoal_core::settings::IndexerEndpoint;
use tracing::info;

use super::{IndexerProvider, base_url, fetch_json};
use crate::errors::SearchError;
use crate::types::{FieldMap, SearchResult};

const SERVICE: &str = "Prowlarr";
const RESULT_LIMIT: usize = 10;

const FIELDS: FieldMap = FieldMap {
    title: "title",
    download_url: "downloadUrl",
    magnet_url: "magnetUrl",
    size: "size",
    seeders: "seeders",
    leechers: "leechers",
    indexer: "indexer",
    publish_date: "publishDate",
    category: "category",
    strict_magnet: false,
};

/// Prowlarr v1 API client. Authenticates with the `X-Api-Key` header.
#[derive(Debug, Clone)]
pub struct ProwlarrProvider {
    client: reqwest::Client,
}

impl ProwlarrProvider {
    /// Creates a provider issuing requests through `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IndexerProvider for ProwlarrProvider {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn search(
        &self,
        endpoint: &IndexerEndpoint,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let host = base_url(SERVICE, endpoint)?;
        let url = format!(
            "{host}/api/v1/search?query={}&limit={RESULT_LIMIT}",
            urlencoding::encode(query)
        );

        let body = fetch_json(
            SERVICE,
            self.client.get(url).header("X-Api-Key", &endpoint.api_key),
        )
        .await?;

        let Value::Array(records) = body else {
            return Err(SearchError::Parse {
                service: SERVICE,
                reason: "expected a JSON array of releases".to_string(),
            });
        };

        let results: Vec<_> = records.iter().filter_map(|r| FIELDS.remap(r)).collect();
        info!(query, received = records.len(), kept = results.len(), "Prowlarr search complete");
        Ok(results)
    }

    async fn test_connection(&self, endpoint: &IndexerEndpoint) -> Result<Value, SearchError> {
        let host = base_url(SERVICE, endpoint)?;
        fetch_json(
            SERVICE,
            self.client
                .get(format!("{host}/api/v1/system/status"))
                .header("X-Api-Key", &endpoint.api_key),
        )
        .await
    }
}
