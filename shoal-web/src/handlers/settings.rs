//! Settings handlers.
//!
//! Each save replaces one group of fields, persists the file and publishes
//! a new settings generation. Proxy saves also drop the cached control
//! client so the next outbound call sees the new route.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Value, json};
use shoal_core::GatewayError;
use shoal_core::proxy::ProxyEndpoint;
use shoal_core::settings::{JackettSettings, ProwlarrSettings, ProxySettings, Settings};
use tracing::info;

use super::error::ApiError;
use crate::server::AppState;

fn saved(service: &str) -> Json<Value> {
    Json(json!({ "message": format!("{service} settings saved successfully") }))
}

/// `GET /api/v1/settings`
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.current().as_ref().clone())
}

/// `POST /api/v1/settings/proxy`
///
/// # Errors
/// - 400 - Malformed body, or proxying enabled with an unusable URL
/// - 500 - Settings file could not be written
pub async fn save_proxy(
    State(state): State<AppState>,
    payload: Result<Json<ProxySettings>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(proxy) = payload?;
    if proxy.enable_proxy {
        ProxyEndpoint::parse(&proxy.proxy_url).map_err(ApiError::invalid_proxy)?;
    }

    let snapshot = state
        .settings
        .update(|settings| settings.with_proxy(proxy))
        .map_err(GatewayError::from)?;
    state.router.invalidate();

    info!(
        generation = snapshot.generation,
        enabled = snapshot.settings.enable_proxy,
        "Proxy settings saved"
    );
    Ok(saved("Proxy"))
}

/// `POST /api/v1/settings/prowlarr`
///
/// # Errors
/// - 400 - Malformed body
/// - 500 - Settings file could not be written
pub async fn save_prowlarr(
    State(state): State<AppState>,
    payload: Result<Json<ProwlarrSettings>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(prowlarr) = payload?;
    let snapshot = state
        .settings
        .update(|settings| settings.with_prowlarr(prowlarr))
        .map_err(GatewayError::from)?;

    info!(generation = snapshot.generation, "Prowlarr settings saved");
    Ok(saved("Prowlarr"))
}

/// `POST /api/v1/settings/jackett`
///
/// # Errors
/// - 400 - Malformed body
/// - 500 - Settings file could not be written
pub async fn save_jackett(
    State(state): State<AppState>,
    payload: Result<Json<JackettSettings>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(jackett) = payload?;
    let snapshot = state
        .settings
        .update(|settings| settings.with_jackett(jackett))
        .map_err(GatewayError::from)?;

    info!(generation = snapshot.generation, "Jackett settings saved");
    Ok(saved("Jackett"))
}
