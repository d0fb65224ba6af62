//! Live transfer sessions and the registry that owns them.

mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

pub use registry::SessionRegistry;

use crate::SessionId;
use crate::engine::TransferEngine;
use crate::locator::ContentLocator;
use crate::ports::PortLease;

/// One engine instance bound to one port, keyed by content fingerprint.
///
/// The session exclusively owns its engine and port lease; [`Session::close`]
/// releases both, engine first.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    engine: Box<dyn TransferEngine>,
    lease: PortLease,
    created_at: DateTime<Utc>,
    last_access: Mutex<Instant>,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        locator: &ContentLocator,
        engine: Box<dyn TransferEngine>,
        lease: PortLease,
    ) -> Self {
        let id = locator.fingerprint();
        Self {
            id,
            name: locator
                .display_name()
                .map(str::to_string)
                .unwrap_or_else(|| id.to_string()),
            engine,
            lease,
            created_at: Utc::now(),
            last_access: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.lease.port()
    }

    pub fn engine(&self) -> &dyn TransferEngine {
        self.engine.as_ref()
    }

    /// Marks the session as used now.
    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    /// Time since the last lookup or stream.
    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    /// Stops the engine, then releases the port. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.engine.shutdown().await;
        self.lease.release();
        debug!(session_id = %self.id, port = self.lease.port(), "Session closed");
    }

    pub fn summary(&self) -> SessionSummary {
        let metadata = self.engine.metadata();
        SessionSummary {
            session_id: self.id,
            name: self.name.clone(),
            port: self.port(),
            route: self.engine.route().to_string(),
            created_at: self.created_at,
            idle_seconds: self.idle_for().as_secs(),
            files: metadata.as_ref().map(|m| m.files.len()),
            total_size: metadata.map(|m| m.total_size()),
        }
    }
}

/// Snapshot of a session for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub name: String,
    pub port: u16,
    pub route: String,
    pub created_at: DateTime<Utc>,
    pub idle_seconds: u64,
    /// `None` until metadata resolves
    pub files: Option<usize>,
    /// Bytes across all files; `None` until metadata resolves
    pub total_size: Option<u64>,
}
