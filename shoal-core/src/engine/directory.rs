//! Filesystem-backed engine.
//!
//! Content appears under `<data_dir>/<fingerprint-hex>/`, placed there by
//! whatever fetches it. The engine holds its listen socket for the session's
//! lifetime, treats the directory's appearance as metadata resolution, and
//! serves files straight from disk.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    ContentMetadata, ContentReader, EngineConfig, EngineError, EngineFactory, FileEntry,
    TransferEngine,
};
use crate::locator::ContentLocator;
use crate::proxy::{Dialer, Route};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Creates [`DirectoryEngine`] instances.
#[derive(Debug, Clone)]
pub struct DirectoryEngineFactory {
    bind_ip: IpAddr,
    poll_interval: Duration,
}

impl DirectoryEngineFactory {
    pub fn new() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the interface engines bind their listen port on.
    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }

    /// Sets how often a pending engine rescans its content directory.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for DirectoryEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for DirectoryEngineFactory {
    fn create(&self, config: EngineConfig) -> Result<Box<dyn TransferEngine>, EngineError> {
        let addr = SocketAddr::new(self.bind_ip, config.listen_port);
        let listener = TcpListener::bind(addr).map_err(|source| EngineError::Bind {
            port: config.listen_port,
            source,
        })?;

        debug!(
            port = config.listen_port,
            route = %config.dialer.route(),
            "Directory engine created"
        );

        Ok(Box::new(DirectoryEngine {
            port: config.listen_port,
            dialer: config.dialer,
            data_dir: config.data_dir,
            poll_interval: self.poll_interval,
            listener: Mutex::new(Some(listener)),
            content: Mutex::new(None),
            metadata: RwLock::new(None),
            stopped: CancellationToken::new(),
        }))
    }
}

#[derive(Debug, Clone)]
struct ContentRoot {
    path: PathBuf,
    name: String,
}

/// Engine serving content from a local directory.
#[derive(Debug)]
pub struct DirectoryEngine {
    port: u16,
    dialer: Arc<dyn Dialer>,
    data_dir: PathBuf,
    poll_interval: Duration,
    listener: Mutex<Option<TcpListener>>,
    content: Mutex<Option<ContentRoot>>,
    metadata: RwLock<Option<Arc<ContentMetadata>>>,
    stopped: CancellationToken,
}

impl DirectoryEngine {
    fn root(&self) -> Result<ContentRoot, EngineError> {
        if self.stopped.is_cancelled() {
            return Err(EngineError::Shutdown);
        }
        self.content
            .lock()
            .clone()
            .ok_or(EngineError::MetadataUnavailable)
    }

    async fn try_resolve(
        &self,
        root: &ContentRoot,
    ) -> Result<Option<Arc<ContentMetadata>>, EngineError> {
        let path = root.path.clone();
        let files = tokio::task::spawn_blocking(move || scan_content(&path))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;

        let Some(files) = files else {
            return Ok(None);
        };

        let metadata = Arc::new(ContentMetadata {
            name: root.name.clone(),
            files,
        });
        *self.metadata.write() = Some(metadata.clone());
        info!(
            port = self.port,
            name = %metadata.name,
            files = metadata.files.len(),
            "Content metadata resolved"
        );
        Ok(Some(metadata))
    }
}

#[async_trait]
impl TransferEngine for DirectoryEngine {
    fn listen_port(&self) -> u16 {
        self.port
    }

    fn route(&self) -> Route {
        self.dialer.route()
    }

    async fn add_content(&self, locator: &ContentLocator) -> Result<(), EngineError> {
        if self.stopped.is_cancelled() {
            return Err(EngineError::Shutdown);
        }

        let fingerprint = locator.fingerprint().to_string();
        let root = ContentRoot {
            path: self.data_dir.join(&fingerprint),
            name: locator
                .display_name()
                .map(str::to_string)
                .unwrap_or(fingerprint),
        };

        debug!(
            path = %root.path.display(),
            trackers = locator.trackers().len(),
            "Watching content directory"
        );
        *self.content.lock() = Some(root);
        Ok(())
    }

    fn metadata(&self) -> Option<Arc<ContentMetadata>> {
        self.metadata.read().clone()
    }

    async fn wait_for_metadata(&self) -> Result<Arc<ContentMetadata>, EngineError> {
        loop {
            if let Some(metadata) = self.metadata() {
                return Ok(metadata);
            }

            let root = match self.root() {
                Ok(root) => Some(root),
                Err(EngineError::MetadataUnavailable) => None,
                Err(e) => return Err(e),
            };
            if let Some(root) = root
                && let Some(metadata) = self.try_resolve(&root).await?
            {
                return Ok(metadata);
            }

            tokio::select! {
                _ = self.stopped.cancelled() => return Err(EngineError::Shutdown),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn open_file(&self, index: usize) -> Result<Box<dyn ContentReader>, EngineError> {
        let root = self.root()?;
        let metadata = self.metadata().ok_or(EngineError::MetadataUnavailable)?;
        let entry = metadata.file(index)?;

        let file = tokio::fs::File::open(root.path.join(&entry.path)).await?;
        Ok(Box::new(file))
    }

    async fn shutdown(&self) {
        if self.stopped.is_cancelled() {
            return;
        }
        self.stopped.cancel();
        self.listener.lock().take();
        debug!(port = self.port, "Directory engine stopped");
    }
}

/// Lists regular files under `root` recursively, sorted by relative path.
/// Returns `None` while the directory does not exist.
fn scan_content(root: &Path) -> Result<Option<Vec<FileEntry>>, EngineError> {
    if !root.is_dir() {
        return Ok(None);
    }

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .map(|p| {
                        p.components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
                found.push((relative, entry.metadata()?.len()));
            }
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Some(
        found
            .into_iter()
            .enumerate()
            .map(|(index, (path, length))| FileEntry {
                index,
                path,
                length,
            })
            .collect(),
    ))
}
