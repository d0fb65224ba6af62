//! Structured JSON error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shoal_core::{GatewayError, ProxyError, SessionId};
use shoal_search::SearchError;
use tracing::{debug, error};

/// Error returned by every handler.
///
/// Renders as `{"error": ..., "kind": ..., "sessionId"?: ...}` with the
/// status chosen from the error class.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    session_id: Option<SessionId>,
}

impl ApiError {
    /// Creates an error with an explicit status and kind.
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            session_id: None,
        }
    }

    /// 400 caused by the request itself.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", message)
    }

    /// 500 for failures inside the gateway.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    /// 400 for a proxy URL rejected while saving or testing settings.
    pub fn invalid_proxy(err: ProxyError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_proxy_config", err.to_string())
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Error class name written to the body.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream { .. }
            | GatewayError::InvalidProxyConfig { .. }
            | GatewayError::Settings(_)
            | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            kind: err.kind(),
            session_id: err.session_id(),
            message: err.to_string(),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        let (status, kind) = match &err {
            e if e.is_user_error() => (StatusCode::BAD_REQUEST, "validation"),
            SearchError::UpstreamStatus { status, .. } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream",
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "upstream"),
        };
        Self::new(status, kind, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, kind = self.kind, "{}", self.message);
        } else {
            debug!(status = %self.status, kind = self.kind, "{}", self.message);
        }

        let mut body = json!({
            "error": self.message,
            "kind": self.kind,
        });
        if let Some(session_id) = self.session_id {
            body["sessionId"] = json!(session_id);
        }

        (self.status, Json(body)).into_response()
    }
}
