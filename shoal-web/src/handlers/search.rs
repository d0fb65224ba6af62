//! Indexer search and connectivity-test handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use shoal_core::ProxyError;
use shoal_core::settings::{JackettSettings, ProwlarrSettings};
use shoal_search::{Indexer, SearchResult};
use tracing::info;

use super::error::ApiError;
use crate::server::AppState;

/// Query of the search endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Free-text search
    #[serde(default)]
    pub q: String,
}

/// Body of the proxy test endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTestRequest {
    /// SOCKS5 URL to probe through
    #[serde(default)]
    pub proxy_url: String,
}

async fn search(
    state: &AppState,
    indexer: Indexer,
    query: &str,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let results = state.search.search(indexer, query).await?;
    info!(%indexer, results = results.len(), "Search completed");
    Ok(Json(results))
}

/// `POST /api/v1/prowlarr/search?q=`
///
/// # Errors
/// - 400 - Blank query or Prowlarr not configured
/// - Upstream status - Prowlarr rejected the request
/// - 500 - Prowlarr unreachable or returned garbage
pub async fn search_prowlarr(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    search(&state, Indexer::Prowlarr, &query.q).await
}

/// `POST /api/v1/jackett/search?q=`
///
/// # Errors
/// - 400 - Blank query or Jackett not configured
/// - Upstream status - Jackett rejected the request
/// - 500 - Jackett unreachable or returned garbage
pub async fn search_jackett(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    search(&state, Indexer::Jackett, &query.q).await
}

/// `POST /api/v1/prowlarr/test`
///
/// # Errors
/// - 400 - Host or API key missing
/// - Upstream status or 500 - Connection failed
pub async fn test_prowlarr(
    State(state): State<AppState>,
    payload: Result<Json<ProwlarrSettings>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(settings) = payload?;
    let status = state
        .search
        .test_connection(Indexer::Prowlarr, &settings.into())
        .await?;
    Ok(Json(status))
}

/// `POST /api/v1/jackett/test`
///
/// # Errors
/// - 400 - Host or API key missing
/// - Upstream status or 500 - Connection failed
pub async fn test_jackett(
    State(state): State<AppState>,
    payload: Result<Json<JackettSettings>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(settings) = payload?;
    let status = state
        .search
        .test_connection(Indexer::Jackett, &settings.into())
        .await?;
    Ok(Json(status))
}

/// `POST /api/v1/proxy/test`
///
/// Fetches the probe URL through the submitted proxy and passes the body
/// through.
///
/// # Errors
/// - 400 - Missing or unusable proxy URL
/// - 500 - Probe request failed
pub async fn test_proxy(
    State(state): State<AppState>,
    payload: Result<Json<ProxyTestRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let proxy_url = request.proxy_url.trim();
    if proxy_url.is_empty() {
        return Err(ApiError::bad_request("Proxy URL not set"));
    }

    match state.router.probe(proxy_url).await {
        Ok(body) => {
            info!("Proxy test succeeded");
            Ok((StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response())
        }
        Err(e @ ProxyError::InvalidUrl { .. }) => Err(ApiError::invalid_proxy(e)),
        Err(e) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream",
            e.to_string(),
        )),
    }
}
