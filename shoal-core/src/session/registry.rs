//! Concurrent session registry.
//!
//! Sessions are keyed by fingerprint in a sharded map, so unrelated
//! sessions never contend on one lock. The port set has its own lock inside
//! [`PortAllocator`]. Teardown removes the map entry first and releases the
//! port afterwards, never holding both.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};

use super::{Session, SessionSummary};
use crate::config::SessionConfig;
use crate::engine::{EngineConfig, EngineFactory};
use crate::locator::ContentLocator;
use crate::ports::PortAllocator;
use crate::proxy::ProxyRouter;
use crate::{GatewayError, Result, SessionId};

/// Engine constructions attempted when the listen port cannot be bound.
const BIND_ATTEMPTS: usize = 3;

/// Maps content fingerprints to live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    allocator: PortAllocator,
    router: Arc<ProxyRouter>,
    factory: Arc<dyn EngineFactory>,
    data_dir: PathBuf,
    metadata_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        allocator: PortAllocator,
        router: Arc<ProxyRouter>,
        factory: Arc<dyn EngineFactory>,
        data_dir: PathBuf,
        config: &SessionConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            allocator,
            router,
            factory,
            data_dir,
            metadata_timeout: config.metadata_timeout,
        }
    }

    pub fn allocator(&self) -> &PortAllocator {
        &self.allocator
    }

    /// Creates (or joins) the session for `locator` and waits for its
    /// metadata.
    ///
    /// The session is published as soon as the engine accepts the content.
    /// If metadata then takes longer than the configured bound, the caller
    /// gets `Timeout` carrying the session id and the session stays live so
    /// later listing requests can succeed; there is no retry beyond that.
    ///
    /// A second create for a fingerprint that is already live joins the
    /// existing session. When two creates race, the first to publish wins
    /// and the loser tears down its own engine and port.
    ///
    /// # Errors
    /// - `GatewayError::InvalidProxyConfig` - Stored proxy URL is unusable
    /// - `GatewayError::Validation` - Engine rejected the content
    /// - `GatewayError::Upstream` - Engine construction failed
    /// - `GatewayError::Timeout` - Metadata did not resolve in time
    pub async fn create_session(&self, locator: &ContentLocator) -> Result<SessionId> {
        let id = locator.fingerprint();

        if let Some(existing) = self.get(&id) {
            info!(session_id = %id, "Content already has a live session");
            existing.touch();
            return self.await_metadata(&existing).await;
        }

        let candidate = Arc::new(self.build_session(locator).await?);

        let winner = match self.sessions.entry(id) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(candidate.clone());
                None
            }
        };

        let session = match winner {
            Some(winner) => {
                debug!(
                    session_id = %id,
                    port = candidate.port(),
                    "Lost publish race, discarding engine"
                );
                candidate.close().await;
                winner
            }
            None => {
                info!(
                    session_id = %id,
                    port = candidate.port(),
                    route = %candidate.engine().route(),
                    "Session published"
                );
                candidate
            }
        };

        self.await_metadata(&session).await
    }

    /// Allocates a port and engine for `locator`. Every failure path
    /// releases what was acquired before returning.
    async fn build_session(&self, locator: &ContentLocator) -> Result<Session> {
        let dialer = self.router.engine_dialer()?;

        let mut attempt = 0;
        let (engine, lease) = loop {
            attempt += 1;
            let lease = self.allocator.allocate();
            let config = EngineConfig {
                listen_port: lease.port(),
                dialer: dialer.clone(),
                data_dir: self.data_dir.clone(),
            };

            match self.factory.create(config) {
                Ok(engine) => break (engine, lease),
                Err(e) if e.is_retryable() && attempt < BIND_ATTEMPTS => {
                    warn!(
                        port = lease.port(),
                        attempt,
                        error = %e,
                        "Retrying engine with another port"
                    );
                }
                Err(e) => {
                    warn!(port = lease.port(), error = %e, "Engine construction failed");
                    return Err(e.into());
                }
            }
        };

        if let Err(e) = engine.add_content(locator).await {
            warn!(port = lease.port(), error = %e, "Engine rejected content");
            engine.shutdown().await;
            return Err(e.into());
        }

        Ok(Session::new(locator, engine, lease))
    }

    async fn await_metadata(&self, session: &Session) -> Result<SessionId> {
        let id = session.id();
        let wait = session.engine().wait_for_metadata();
        match tokio::time::timeout(self.metadata_timeout, wait).await {
            Ok(Ok(metadata)) => {
                debug!(session_id = %id, files = metadata.files.len(), "Metadata ready");
                Ok(id)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(
                    session_id = %id,
                    waited_secs = self.metadata_timeout.as_secs(),
                    "Timed out waiting for metadata; session kept for polling"
                );
                Err(GatewayError::Timeout {
                    operation: "content metadata",
                    waited: self.metadata_timeout,
                    session_id: Some(id),
                })
            }
        }
    }

    fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Returns the live session and refreshes its last-access time.
    ///
    /// # Errors
    /// - `GatewayError::SessionNotFound` - No live session for `id`
    pub fn lookup(&self, id: &SessionId) -> Result<Arc<Session>> {
        let session = self.get(id).ok_or_else(|| GatewayError::SessionNotFound {
            session_id: id.to_string(),
        })?;
        session.touch();
        Ok(session)
    }

    /// Removes the session, stops its engine and releases its port.
    /// Returns whether a session was removed.
    pub async fn evict(&self, id: &SessionId) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        session.close().await;
        info!(session_id = %id, "Session evicted");
        true
    }

    /// Evicts the session only if it has been idle for at least `ttl`. The
    /// idle check and removal are atomic with respect to other map writers.
    pub async fn evict_if_idle(&self, id: &SessionId, ttl: Duration) -> bool {
        let Some((_, session)) = self
            .sessions
            .remove_if(id, |_, session| session.idle_for() >= ttl)
        else {
            return false;
        };
        let idle = session.idle_for();
        session.close().await;
        info!(session_id = %id, idle_secs = idle.as_secs(), "Idle session evicted");
        true
    }

    /// Fingerprints of all live sessions.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut summaries: Vec<_> = sessions.iter().map(|s| s.summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tears down every live session. Returns how many were closed.
    pub async fn shutdown_all(&self) -> usize {
        let mut closed = 0;
        for id in self.ids() {
            if self.evict(&id).await {
                closed += 1;
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShoalConfig;
    use crate::engine::test_mocks::{MetadataBehavior, MockEngineFactory};
    use crate::settings::{Settings, SettingsStore};

    const HASH: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    fn registry(factory: MockEngineFactory, settings: Settings) -> SessionRegistry {
        let config = ShoalConfig::for_testing();
        let router = ProxyRouter::new(SettingsStore::in_memory(settings), config.network).unwrap();
        SessionRegistry::new(
            PortAllocator::new(config.ports),
            Arc::new(router),
            Arc::new(factory),
            std::env::temp_dir(),
            &config.sessions,
        )
    }

    fn locator() -> ContentLocator {
        ContentLocator::parse(&format!("magnet:?xt=urn:btih:{HASH}&dn=Demo")).unwrap()
    }

    #[tokio::test]
    async fn test_create_lookup_evict() {
        let factory = MockEngineFactory::new().with_file("a.mp4", b"x".to_vec());
        let registry = registry(factory.clone(), Settings::default());

        let id = registry.create_session(&locator()).await.unwrap();
        assert_eq!(id.to_string(), HASH);

        let session = registry.lookup(&id).unwrap();
        assert_eq!(session.name(), "Demo");
        assert!(registry.allocator().is_in_use(session.port()));

        assert!(registry.evict(&id).await);
        assert!(!registry.evict(&id).await);
        assert!(!registry.allocator().is_in_use(session.port()));
        assert_eq!(factory.live_count(), 0);
        assert!(matches!(
            registry.lookup(&id),
            Err(GatewayError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_repeat_create_joins_existing_session() {
        let factory = MockEngineFactory::new();
        let registry = registry(factory.clone(), Settings::default());

        let first = registry.create_session(&locator()).await.unwrap();
        let second = registry.create_session(&locator()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(factory.created_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_construction_failure_releases_port() {
        let registry = registry(MockEngineFactory::new().fail_creation(), Settings::default());

        let result = registry.create_session(&locator()).await;

        assert!(matches!(result, Err(GatewayError::Upstream { .. })));
        assert_eq!(registry.allocator().in_use_count(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_content_releases_port_and_engine() {
        let factory = MockEngineFactory::new().fail_add();
        let registry = registry(factory.clone(), Settings::default());

        let result = registry.create_session(&locator()).await;

        assert!(matches!(result, Err(GatewayError::Validation { .. })));
        assert_eq!(registry.allocator().in_use_count(), 0);
        assert_eq!(factory.live_count(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_retries_with_new_port() {
        let factory = MockEngineFactory::new().fail_binds(2);
        let registry = registry(factory.clone(), Settings::default());

        registry.create_session(&locator()).await.unwrap();

        assert_eq!(factory.created_count(), 1);
        assert_eq!(registry.allocator().in_use_count(), 1);
    }

    #[tokio::test]
    async fn test_bind_failures_exhaust_attempts() {
        let factory = MockEngineFactory::new().fail_binds(BIND_ATTEMPTS);
        let registry = registry(factory, Settings::default());

        let result = registry.create_session(&locator()).await;

        assert!(matches!(result, Err(GatewayError::Upstream { .. })));
        assert_eq!(registry.allocator().in_use_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_stored_proxy_fails_before_allocation() {
        let factory = MockEngineFactory::new();
        let registry = registry(
            factory.clone(),
            Settings {
                enable_proxy: true,
                proxy_url: "http://not-socks".to_string(),
                ..Default::default()
            },
        );

        let result = registry.create_session(&locator()).await;

        assert!(matches!(
            result,
            Err(GatewayError::InvalidProxyConfig { .. })
        ));
        assert_eq!(factory.created_count(), 0);
        assert_eq!(registry.allocator().in_use_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_timeout_keeps_session() {
        let factory = MockEngineFactory::new().with_metadata(MetadataBehavior::Held);
        let registry = registry(factory.clone(), Settings::default());

        let err = registry.create_session(&locator()).await.unwrap_err();
        let id = err.session_id().unwrap();
        assert!(matches!(err, GatewayError::Timeout { .. }));

        let session = registry.lookup(&id).unwrap();
        assert!(session.engine().metadata().is_none());

        factory.release_metadata();
        assert!(session.engine().metadata().is_some());
        assert_eq!(registry.summaries()[0].files, Some(0));
    }

    #[tokio::test]
    async fn test_shutdown_all_closes_everything() {
        let factory = MockEngineFactory::new();
        let registry = registry(factory.clone(), Settings::default());

        for hash in [HASH, "0123456789abcdef0123456789abcdef01234567"] {
            let locator = ContentLocator::parse(&format!("magnet:?xt=urn:btih:{hash}")).unwrap();
            registry.create_session(&locator).await.unwrap();
        }

        assert_eq!(registry.shutdown_all().await, 2);
        assert!(registry.is_empty());
        assert_eq!(factory.live_count(), 0);
        assert_eq!(registry.allocator().in_use_count(), 0);
    }
}
