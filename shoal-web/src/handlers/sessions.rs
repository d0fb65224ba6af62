//! Session management handlers: add content, list files, teardown.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use shoal_core::locator::{self, ContentLocator};
use shoal_core::session::SessionSummary;
use shoal_core::streaming::{FileListing, parse_session_id};
use shoal_core::{GatewayError, SessionId};
use tracing::info;

use super::error::ApiError;
use crate::server::AppState;

/// Body of the add-content endpoint.
#[derive(Debug, Deserialize)]
pub struct AddContentRequest {
    /// Magnet URI or indexer download link
    #[serde(default)]
    pub magnet: String,
}

/// Successful add-content response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContentResponse {
    /// Id to use for listing and streaming
    pub session_id: SessionId,
}

/// `POST /api/v1/torrent/add`
///
/// # Errors
/// - 400 - Missing, malformed, or unresolvable locator
/// - 504 - Metadata not resolved in time; the body still carries `sessionId`
/// - 500 - Engine or proxy construction failed
pub async fn add_content(
    State(state): State<AppState>,
    payload: Result<Json<AddContentRequest>, JsonRejection>,
) -> Result<Json<AddContentResponse>, ApiError> {
    let Json(request) = payload?;
    let raw = request.magnet.trim();
    if raw.is_empty() {
        return Err(ApiError::bad_request("No magnet link provided"));
    }

    let magnet = if locator::is_download_link(raw) {
        let control = state.router.control_client().map_err(GatewayError::from)?;
        locator::resolve_download_link(&control.client, raw, &state.config.network.user_agent)
            .await?
    } else {
        raw.to_string()
    };

    let locator = ContentLocator::parse(&magnet)?;
    let session_id = state.registry.create_session(&locator).await?;

    info!(%session_id, "Content added");
    Ok(Json(AddContentResponse { session_id }))
}

/// `GET /api/v1/torrent/{id}`
///
/// # Errors
/// - 404 - Unknown session
/// - 504 - Metadata still unresolved
pub async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileListing>>, ApiError> {
    let id = parse_session_id(&id)?;
    Ok(Json(state.streaming.list_files(&id).await?))
}

/// `DELETE /api/v1/torrent/{id}`
///
/// # Errors
/// - 404 - Unknown session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    if state.registry.evict(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::SessionNotFound {
            session_id: id.to_string(),
        }
        .into())
    }
}

/// `GET /api/v1/sessions`
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.summaries())
}
