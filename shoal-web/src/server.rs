//! JSON API server for Shoal
//!
//! Wires the session registry, streaming service, proxy router and search
//! service into one axum router, and owns the process lifecycle: the idle
//! reaper runs until shutdown, after which every session is torn down.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use shoal_core::config::ShoalConfig;
use shoal_core::engine::directory::DirectoryEngineFactory;
use shoal_core::{
    EngineFactory, IdleReaper, PortAllocator, ProxyError, ProxyRouter, SessionRegistry,
    SettingsError, SettingsStore, StreamingService,
};
use shoal_search::SearchService;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::handlers::convert::MAX_TORRENT_SIZE;
use crate::handlers::{
    add_content, convert_torrent, delete_session, get_settings, list_files, list_sessions,
    save_jackett, save_prowlarr, save_proxy, search_jackett, search_prowlarr, stream_file,
    test_jackett, test_prowlarr, test_proxy,
};

/// Headroom over the torrent cap for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Errors that stop the server from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Settings file unreadable or corrupt
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Stored proxy settings unusable for client construction
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Listener or filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions and their ports
    pub registry: Arc<SessionRegistry>,
    /// File listings and stream bodies
    pub streaming: StreamingService,
    /// Outbound routing decisions
    pub router: Arc<ProxyRouter>,
    /// Persisted user settings
    pub settings: SettingsStore,
    /// Indexer search
    pub search: SearchService,
    /// Process configuration
    pub config: Arc<ShoalConfig>,
}

impl AppState {
    /// Builds the service graph around `settings` and `engines`.
    ///
    /// # Errors
    /// - `ServerError::Proxy` - HTTP clients could not be constructed
    pub fn new(
        config: ShoalConfig,
        settings: SettingsStore,
        engines: Arc<dyn EngineFactory>,
    ) -> Result<Self, ServerError> {
        let router = Arc::new(ProxyRouter::new(settings.clone(), config.network.clone())?);
        let registry = Arc::new(SessionRegistry::new(
            PortAllocator::new(config.ports.clone()),
            router.clone(),
            engines,
            config.server.data_dir.clone(),
            &config.sessions,
        ));
        let streaming =
            StreamingService::new(registry.clone(), &config.sessions, &config.streaming);
        let search = SearchService::new(settings.clone(), router.direct_client());

        Ok(Self {
            registry,
            streaming,
            router,
            settings,
            search,
            config: Arc::new(config),
        })
    }
}

/// Builds the HTTP router. Unmatched paths are served from `client_dir`.
pub fn build_router(state: AppState, client_dir: &Path) -> Router {
    Router::new()
        // Sessions and streaming
        .route("/api/v1/torrent/add", post(add_content))
        .route(
            "/api/v1/torrent/convert",
            post(convert_torrent)
                .layer(DefaultBodyLimit::max(MAX_TORRENT_SIZE + MULTIPART_OVERHEAD)),
        )
        .route("/api/v1/torrent/{id}", get(list_files).delete(delete_session))
        .route("/api/v1/torrent/{id}/stream/{file}", get(stream_file))
        .route("/api/v1/sessions", get(list_sessions))
        // Settings
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/settings/proxy", post(save_proxy))
        .route("/api/v1/settings/prowlarr", post(save_prowlarr))
        .route("/api/v1/settings/jackett", post(save_jackett))
        // Indexers and connectivity
        .route("/api/v1/prowlarr/search", post(search_prowlarr))
        .route("/api/v1/jackett/search", post(search_jackett))
        .route("/api/v1/prowlarr/test", post(test_prowlarr))
        .route("/api/v1/jackett/test", post(test_jackett))
        .route("/api/v1/proxy/test", post(test_proxy))
        // Browser client
        .fallback_service(ServeDir::new(client_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the gateway until Ctrl-C, then tears down every session.
///
/// # Errors
/// - `ServerError::Settings` - Settings file unreadable or corrupt
/// - `ServerError::Io` - Data directory or listener could not be set up
pub async fn run_server(config: ShoalConfig) -> Result<(), ServerError> {
    let settings = SettingsStore::load_or_init(&config.server.settings_path)?;
    tokio::fs::create_dir_all(&config.server.data_dir).await?;

    let engines: Arc<dyn EngineFactory> = Arc::new(DirectoryEngineFactory::new());
    let state = AppState::new(config.clone(), settings, engines)?;

    let cancel = CancellationToken::new();
    let reaper = IdleReaper::new(state.registry.clone(), &config.sessions).spawn(cancel.clone());

    let app = build_router(state.clone(), &config.server.client_dir);
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        data_dir = %config.server.data_dir.display(),
        "Shoal gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = reaper.await {
        warn!(error = %e, "Idle reaper task failed");
    }
    let closed = state.registry.shutdown_all().await;
    info!(closed, "Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C; shutting down"),
    }
}
