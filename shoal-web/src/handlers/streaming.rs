//! File streaming handler.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use shoal_core::streaming::{StreamBody, StreamRequest};
use tracing::debug;

use super::error::ApiError;
use super::range::serve_range;
use crate::server::AppState;

/// Optional query of the stream endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// `vtt` requests subtitle transcoding
    pub format: Option<String>,
}

/// `GET /api/v1/torrent/{id}/stream/{file}`
///
/// `{file}` is a file index, optionally suffixed with `.vtt`.
///
/// # Errors
/// - 400 - Bad or out-of-range file index
/// - 404 - Unknown session
/// - 504 - Metadata still unresolved
pub async fn stream_file(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let request = StreamRequest::parse(&id, &file, query.format.as_deref())?;
    let body = state.streaming.open_stream(&request).await?;
    let media_type = body.media_type();

    let mut response = match body {
        StreamBody::Transcoded { body, media_type } => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, media_type.mime)
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))?,
        StreamBody::Raw {
            reader,
            length,
            media_type,
            file_name,
        } => {
            debug!(%file_name, length, "Serving raw file");
            serve_range(reader, length, media_type.mime, headers.get(RANGE)).await?
        }
    };

    if media_type.subtitle {
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
    Ok(response)
}
