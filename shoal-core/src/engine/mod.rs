//! Transfer engine abstraction.
//!
//! The gateway never speaks a transfer protocol itself. An engine is
//! created per session through an [`EngineFactory`], receives its listen
//! port and outbound [`Dialer`] as constructor parameters, and exposes the
//! four capabilities the gateway needs: add content, wait for metadata,
//! enumerate files, and open a seekable reader for one file.

pub mod directory;
pub mod test_mocks;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};

pub use directory::{DirectoryEngine, DirectoryEngineFactory};

use crate::locator::ContentLocator;
use crate::proxy::{Dialer, Route};

/// Errors reported by engine implementations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid content: {reason}")]
    InvalidContent { reason: String },

    #[error("File index {index} out of range ({count} files)")]
    FileIndexOutOfRange { index: usize, count: usize },

    #[error("Failed to bind listen port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("Engine construction failed: {reason}")]
    Construction { reason: String },

    #[error("Content metadata is not available yet")]
    MetadataUnavailable,

    #[error("Engine has been shut down")]
    Shutdown,

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether retrying with a different listen port may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Bind { .. })
    }
}

/// Everything an engine instance is constructed with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub listen_port: u16,
    pub dialer: Arc<dyn Dialer>,
    pub data_dir: PathBuf,
}

/// One file inside resolved content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub index: usize,
    /// Path relative to the content root, `/`-separated
    pub path: String,
    pub length: u64,
}

impl FileEntry {
    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lowercase extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rfind('.')
            .filter(|&dot| dot + 1 < name.len())
            .map(|dot| name[dot + 1..].to_ascii_lowercase())
    }
}

/// Resolved content description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    pub name: String,
    pub files: Vec<FileEntry>,
}

impl ContentMetadata {
    /// Returns the file at `index`.
    ///
    /// # Errors
    /// - `EngineError::FileIndexOutOfRange` - `index >= files.len()`
    pub fn file(&self, index: usize) -> Result<&FileEntry, EngineError> {
        self.files.get(index).ok_or(EngineError::FileIndexOutOfRange {
            index,
            count: self.files.len(),
        })
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }
}

/// Seekable byte source for one file.
pub trait ContentReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ContentReader for T {}

/// Live engine instance bound to one piece of content.
#[async_trait]
pub trait TransferEngine: Send + Sync + fmt::Debug {
    /// Port the engine listens on.
    fn listen_port(&self) -> u16;

    /// Route the engine's outbound connections use.
    fn route(&self) -> Route;

    /// Starts acquiring the content identified by `locator`.
    ///
    /// # Errors
    /// - `EngineError::InvalidContent` - Engine rejects the locator
    /// - `EngineError::Shutdown` - Engine already stopped
    async fn add_content(&self, locator: &ContentLocator) -> Result<(), EngineError>;

    /// Metadata if already resolved; never blocks.
    fn metadata(&self) -> Option<Arc<ContentMetadata>>;

    /// Resolves once metadata is known. Unbounded; callers apply their own
    /// timeout.
    ///
    /// # Errors
    /// - `EngineError::Shutdown` - Engine stopped while waiting
    async fn wait_for_metadata(&self) -> Result<Arc<ContentMetadata>, EngineError>;

    /// Opens a seekable reader for file `index`.
    ///
    /// # Errors
    /// - `EngineError::MetadataUnavailable` - Metadata not resolved yet
    /// - `EngineError::FileIndexOutOfRange` - No such file
    /// - `EngineError::Io` - Underlying storage failed
    async fn open_file(&self, index: usize) -> Result<Box<dyn ContentReader>, EngineError>;

    /// Stops the engine and releases its listen socket. Idempotent.
    async fn shutdown(&self);
}

/// Constructs engine instances.
pub trait EngineFactory: Send + Sync + fmt::Debug {
    /// Creates an engine listening on `config.listen_port`.
    ///
    /// # Errors
    /// - `EngineError::Bind` - Listen port unavailable (retryable)
    /// - `EngineError::Construction` - Any other construction failure
    fn create(&self, config: EngineConfig) -> Result<Box<dyn TransferEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, path: &str) -> FileEntry {
        FileEntry {
            index,
            path: path.to_string(),
            length: 10,
        }
    }

    #[test]
    fn test_file_entry_name_and_extension() {
        let nested = entry(0, "Season 1/Episode.01.MKV");
        assert_eq!(nested.file_name(), "Episode.01.MKV");
        assert_eq!(nested.extension().as_deref(), Some("mkv"));

        assert_eq!(entry(1, "README").extension(), None);
        assert_eq!(entry(2, "trailing.").extension(), None);
    }

    #[test]
    fn test_metadata_file_lookup_is_bounds_checked() {
        let metadata = ContentMetadata {
            name: "demo".to_string(),
            files: vec![entry(0, "a.mp4"), entry(1, "a.srt")],
        };

        assert_eq!(metadata.file(1).unwrap().path, "a.srt");
        assert_eq!(metadata.total_size(), 20);
        assert!(matches!(
            metadata.file(2),
            Err(EngineError::FileIndexOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_only_bind_failures_are_retryable() {
        let bind = EngineError::Bind {
            port: 1,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(bind.is_retryable());
        assert!(!EngineError::Shutdown.is_retryable());
    }
}
