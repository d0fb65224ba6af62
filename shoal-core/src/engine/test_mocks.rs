//! Scriptable engine for testing session and streaming behaviour.

use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio::sync::watch;

use super::{
    ContentMetadata, ContentReader, EngineConfig, EngineError, EngineFactory, FileEntry,
    TransferEngine,
};
use crate::locator::ContentLocator;
use crate::proxy::{Dialer, Route};

/// How quickly mock engines resolve metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBehavior {
    /// Resolved as soon as content is added
    Immediate,
    /// Resolved after a fixed delay (honours a paused tokio clock)
    Delayed(Duration),
    /// Resolved only after [`MockEngineFactory::release_metadata`]
    Held,
}

#[derive(Debug)]
struct MockState {
    name: String,
    files: Mutex<Vec<(String, Vec<u8>)>>,
    behavior: Mutex<MetadataBehavior>,
    released: watch::Sender<bool>,
    fail_create: AtomicBool,
    fail_add: AtomicBool,
    bind_failures: AtomicUsize,
    created: AtomicUsize,
    shutdowns: AtomicUsize,
    readers_opened: AtomicUsize,
    readers_dropped: AtomicUsize,
    ports: Mutex<Vec<u16>>,
    routes: Mutex<Vec<Route>>,
}

/// Factory producing in-memory engines with configurable failures.
///
/// Clones share state, so a test can keep one handle for assertions after
/// moving another into the registry.
#[derive(Debug, Clone)]
pub struct MockEngineFactory {
    state: Arc<MockState>,
}

impl MockEngineFactory {
    /// Creates a factory whose engines resolve immediately to no files.
    pub fn new() -> Self {
        let (released, _) = watch::channel(false);
        Self {
            state: Arc::new(MockState {
                name: "Mock Content".to_string(),
                files: Mutex::new(Vec::new()),
                behavior: Mutex::new(MetadataBehavior::Immediate),
                released,
                fail_create: AtomicBool::new(false),
                fail_add: AtomicBool::new(false),
                bind_failures: AtomicUsize::new(0),
                created: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
                readers_opened: AtomicUsize::new(0),
                readers_dropped: AtomicUsize::new(0),
                ports: Mutex::new(Vec::new()),
                routes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Adds a file served by every engine from this factory.
    pub fn with_file(self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.state
            .files
            .lock()
            .push((path.to_string(), contents.into()));
        self
    }

    pub fn with_metadata(self, behavior: MetadataBehavior) -> Self {
        *self.state.behavior.lock() = behavior;
        self
    }

    /// Makes every `create` call fail.
    pub fn fail_creation(self) -> Self {
        self.state.fail_create.store(true, Ordering::SeqCst);
        self
    }

    /// Makes every `add_content` call fail with `InvalidContent`.
    pub fn fail_add(self) -> Self {
        self.state.fail_add.store(true, Ordering::SeqCst);
        self
    }

    /// Makes the next `count` creations fail with a bind error.
    pub fn fail_binds(self, count: usize) -> Self {
        self.state.bind_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Resolves metadata for engines configured with [`MetadataBehavior::Held`].
    pub fn release_metadata(&self) {
        self.state.released.send_replace(true);
    }

    /// Engines successfully created so far.
    pub fn created_count(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// Engines shut down so far (each counted once).
    pub fn shutdown_count(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    /// Engines created but not yet shut down.
    pub fn live_count(&self) -> usize {
        self.created_count() - self.shutdown_count()
    }

    /// File readers handed out and not yet dropped.
    pub fn open_readers(&self) -> usize {
        self.state.readers_opened.load(Ordering::SeqCst)
            - self.state.readers_dropped.load(Ordering::SeqCst)
    }

    /// File readers dropped so far.
    pub fn dropped_readers(&self) -> usize {
        self.state.readers_dropped.load(Ordering::SeqCst)
    }

    /// Listen ports of every engine created, in creation order.
    pub fn ports(&self) -> Vec<u16> {
        self.state.ports.lock().clone()
    }

    /// Dialer routes every engine was constructed with.
    pub fn routes(&self) -> Vec<Route> {
        self.state.routes.lock().clone()
    }
}

impl Default for MockEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, config: EngineConfig) -> Result<Box<dyn TransferEngine>, EngineError> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Construction {
                reason: "Mock engine construction failure".to_string(),
            });
        }

        let bind_failure = self
            .state
            .bind_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if bind_failure {
            return Err(EngineError::Bind {
                port: config.listen_port,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }

        self.state.created.fetch_add(1, Ordering::SeqCst);
        self.state.ports.lock().push(config.listen_port);
        self.state.routes.lock().push(config.dialer.route());

        Ok(Box::new(MockEngine {
            state: self.state.clone(),
            port: config.listen_port,
            dialer: config.dialer,
            added: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            resolved: Mutex::new(None),
        }))
    }
}

/// In-memory engine created by [`MockEngineFactory`].
#[derive(Debug)]
pub struct MockEngine {
    state: Arc<MockState>,
    port: u16,
    dialer: Arc<dyn Dialer>,
    added: AtomicBool,
    stopped: AtomicBool,
    resolved: Mutex<Option<Arc<ContentMetadata>>>,
}

impl MockEngine {
    fn build_metadata(&self) -> Arc<ContentMetadata> {
        let files = self
            .state
            .files
            .lock()
            .iter()
            .enumerate()
            .map(|(index, (path, contents))| FileEntry {
                index,
                path: path.clone(),
                length: contents.len() as u64,
            })
            .collect();

        Arc::new(ContentMetadata {
            name: self.state.name.clone(),
            files,
        })
    }

    fn resolve(&self) -> Arc<ContentMetadata> {
        self.resolved
            .lock()
            .get_or_insert_with(|| self.build_metadata())
            .clone()
    }

    fn check_running(&self) -> Result<(), EngineError> {
        if self.stopped.load(Ordering::SeqCst) {
            Err(EngineError::Shutdown)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransferEngine for MockEngine {
    fn listen_port(&self) -> u16 {
        self.port
    }

    fn route(&self) -> Route {
        self.dialer.route()
    }

    async fn add_content(&self, _locator: &ContentLocator) -> Result<(), EngineError> {
        self.check_running()?;
        if self.state.fail_add.load(Ordering::SeqCst) {
            return Err(EngineError::InvalidContent {
                reason: "Mock engine rejected content".to_string(),
            });
        }

        self.added.store(true, Ordering::SeqCst);
        if *self.state.behavior.lock() == MetadataBehavior::Immediate {
            self.resolve();
        }
        Ok(())
    }

    fn metadata(&self) -> Option<Arc<ContentMetadata>> {
        if let Some(metadata) = self.resolved.lock().clone() {
            return Some(metadata);
        }
        let held = *self.state.behavior.lock() == MetadataBehavior::Held;
        (held && self.added.load(Ordering::SeqCst) && *self.state.released.borrow())
            .then(|| self.resolve())
    }

    async fn wait_for_metadata(&self) -> Result<Arc<ContentMetadata>, EngineError> {
        self.check_running()?;
        if let Some(metadata) = self.metadata() {
            return Ok(metadata);
        }

        let behavior = *self.state.behavior.lock();
        match behavior {
            MetadataBehavior::Immediate => {}
            MetadataBehavior::Delayed(delay) => tokio::time::sleep(delay).await,
            MetadataBehavior::Held => {
                let mut released = self.state.released.subscribe();
                released
                    .wait_for(|released| *released)
                    .await
                    .map_err(|_| EngineError::Shutdown)?;
            }
        }

        self.check_running()?;
        Ok(self.resolve())
    }

    async fn open_file(&self, index: usize) -> Result<Box<dyn ContentReader>, EngineError> {
        self.check_running()?;
        let metadata = self.metadata().ok_or(EngineError::MetadataUnavailable)?;
        metadata.file(index)?;

        let contents = self.state.files.lock()[index].1.clone();
        self.state.readers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedReader {
            inner: Cursor::new(contents),
            state: self.state.clone(),
        }))
    }

    async fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// In-memory file reader that counts itself dropped.
struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    state: Arc<MockState>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for TrackedReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().inner).poll_complete(cx)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.state.readers_dropped.fetch_add(1, Ordering::SeqCst);
    }
}
