//! Torrent file to magnet conversion.

use axum::Json;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartRejection;
use serde_json::{Value, json};
use shoal_core::metainfo::torrent_to_magnet;
use tracing::info;

use super::error::ApiError;

/// Largest accepted torrent upload.
pub const MAX_TORRENT_SIZE: usize = 10 * 1024 * 1024;

/// Multipart form field carrying the torrent file.
const TORRENT_FIELD: &str = "torrent";

/// `POST /api/v1/torrent/convert`
///
/// # Errors
/// - 400 - Not a multipart form, missing field, oversized or invalid torrent
pub async fn convert_torrent(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::bad_request(format!("Failed to parse form: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to parse form: {e}")))?
    {
        if field.name() != Some(TORRENT_FIELD) {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
        if bytes.len() > MAX_TORRENT_SIZE {
            return Err(ApiError::bad_request("File too large"));
        }

        let magnet = torrent_to_magnet(&bytes)?;
        info!(size = bytes.len(), "Converted torrent file to magnet");
        return Ok(Json(json!({ "magnet": magnet })));
    }

    Err(ApiError::bad_request("Missing torrent file"))
}
