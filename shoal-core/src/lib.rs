//! Shoal Core - session lifecycle, proxy routing and streaming
//!
//! This crate owns the parts of the gateway with real resource risk: the
//! registry of live transfer sessions and the ports they hold, the proxy
//! router that decides how engine and control traffic leave the process,
//! and the streaming service that turns a session file into response bytes.

pub mod config;
pub mod engine;
pub mod locator;
pub mod memory;
pub mod metainfo;
pub mod ports;
pub mod proxy;
pub mod reaper;
pub mod session;
pub mod settings;
pub mod streaming;
pub mod tracing_setup;

use std::time::Duration;

// Re-export main types for convenient access
pub use config::ShoalConfig;
pub use engine::{EngineError, EngineFactory, TransferEngine};
pub use locator::{ContentLocator, Fingerprint};
pub use ports::{PortAllocator, PortLease};
pub use proxy::{ProxyError, ProxyRouter};
pub use reaper::IdleReaper;
pub use session::{Session, SessionRegistry};
pub use settings::{Settings, SettingsError, SettingsStore};
pub use streaming::StreamingService;

/// Identifier of a live session; the content fingerprint doubles as the key.
pub type SessionId = Fingerprint;

/// Errors surfaced by gateway operations.
///
/// Each variant corresponds to one response class at the HTTP edge, so
/// handlers can map them without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{reason}")]
    Validation { reason: String },

    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("Timed out after {}s waiting for {operation}", waited.as_secs())]
    Timeout {
        operation: &'static str,
        waited: Duration,
        session_id: Option<SessionId>,
    },

    #[error("Upstream error: {reason}")]
    Upstream { reason: String },

    #[error("Invalid proxy configuration: {reason}")]
    InvalidProxyConfig { reason: String },

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        GatewayError::Validation {
            reason: reason.into(),
        }
    }

    /// Stable name of the variant, used in structured error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation { .. } => "validation",
            GatewayError::SessionNotFound { .. } => "not_found",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Upstream { .. } => "upstream",
            GatewayError::InvalidProxyConfig { .. } => "invalid_proxy_config",
            GatewayError::Settings(_) => "settings",
            GatewayError::Io(_) => "io",
        }
    }

    /// Checks if this error was caused by the caller's input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, GatewayError::Validation { .. })
    }

    /// Session that was published before the failure, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            GatewayError::Timeout { session_id, .. } => *session_id,
            _ => None,
        }
    }
}

impl From<EngineError> for GatewayError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::InvalidContent { reason } => GatewayError::Validation { reason },
            EngineError::FileIndexOutOfRange { index, count } => GatewayError::Validation {
                reason: format!("File index {index} out of range (content has {count} files)"),
            },
            other => GatewayError::Upstream {
                reason: other.to_string(),
            },
        }
    }
}

impl From<ProxyError> for GatewayError {
    fn from(error: ProxyError) -> Self {
        match error {
            ProxyError::InvalidUrl { reason } => GatewayError::InvalidProxyConfig { reason },
            other => GatewayError::Upstream {
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
