//! Jackett indexer client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use shoal_core::settings::IndexerEndpoint;
use tracing::info;

use super::{IndexerProvider, base_url, fetch_json};
use crate::errors::SearchError;
use crate::types::{FieldMap, SearchResult};

const SERVICE: &str = "Jackett";

const FIELDS: FieldMap = FieldMap {
    title: "Title",
    download_url: "Link",
    magnet_url: "MagnetUri",
    size: "Size",
    seeders: "Seeders",
    leechers: "Peers",
    indexer: "Tracker",
    publish_date: "PublishDate",
    category: "category",
    strict_magnet: true,
};

#[derive(Debug, Deserialize)]
struct JackettResponse {
    #[serde(rename = "Results", default)]
    results: Vec<Value>,
}

/// Jackett v2.0 API client. Authenticates with the `apikey` query parameter.
#[derive(Debug, Clone)]
pub struct JackettProvider {
    client: reqwest::Client,
}

impl JackettProvider {
    /// Creates a provider issuing requests through `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn results_url(host: &str, endpoint: &IndexerEndpoint, query: Option<&str>) -> String {
        let api_key = urlencoding::encode(&endpoint.api_key);
        match query {
            Some(query) => format!(
                "{host}/api/v2.0/indexers/all/results?Query={}&apikey={api_key}",
                urlencoding::encode(query)
            ),
            None => format!("{host}/api/v2.0/indexers/all/results?apikey={api_key}"),
        }
    }
}

#[async_trait]
impl IndexerProvider for JackettProvider {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn search(
        &self,
        endpoint: &IndexerEndpoint,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let host = base_url(SERVICE, endpoint)?;
        let url = Self::results_url(host, endpoint, Some(query));

        let body = fetch_json(SERVICE, self.client.get(url)).await?;
        let response: JackettResponse =
            serde_json::from_value(body).map_err(|e| SearchError::Parse {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        let results: Vec<_> = response
            .results
            .iter()
            .filter_map(|r| FIELDS.remap(r))
            .collect();
        info!(
            query,
            received = response.results.len(),
            kept = results.len(),
            "Jackett search complete"
        );
        Ok(results)
    }

    async fn test_connection(&self, endpoint: &IndexerEndpoint) -> Result<Value, SearchError> {
        let host = base_url(SERVICE, endpoint)?;
        fetch_json(SERVICE, self.client.get(Self::results_url(host, endpoint, None))).await
    }
}
