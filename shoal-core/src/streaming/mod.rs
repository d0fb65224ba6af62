//! File listing and stream preparation for live sessions.
//!
//! The service resolves a request down to either a seekable reader (range
//! handling is left to the HTTP layer's byte-range server) or a fully
//! buffered WebVTT body for transcoded subtitles.

pub mod content_type;
pub mod subtitles;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use content_type::MediaType;

use crate::config::{SessionConfig, StreamingConfig};
use crate::engine::{ContentMetadata, ContentReader};
use crate::locator::Fingerprint;
use crate::session::{Session, SessionRegistry};
use crate::{GatewayError, Result, SessionId};

const VTT_SUFFIX: &str = ".vtt";

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    /// Convert subtitles to WebVTT
    Vtt,
}

impl FormatHint {
    /// Parses a `format` query value; unknown values are ignored.
    pub fn from_query(value: &str) -> Option<Self> {
        value.eq_ignore_ascii_case("vtt").then_some(FormatHint::Vtt)
    }
}

/// A parsed stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub session_id: SessionId,
    pub file_index: usize,
    pub format: Option<FormatHint>,
}

impl StreamRequest {
    /// Parses the path segments and query of a stream request.
    ///
    /// `file` is a decimal index, optionally suffixed with `.vtt`.
    ///
    /// # Errors
    /// - `GatewayError::SessionNotFound` - `session_id` is not a fingerprint
    /// - `GatewayError::Validation` - `file` is not a non-negative index
    pub fn parse(session_id: &str, file: &str, format: Option<&str>) -> Result<Self> {
        let session_id = parse_session_id(session_id)?;

        let (index, suffix_hint) = match file.strip_suffix(VTT_SUFFIX) {
            Some(index) => (index, Some(FormatHint::Vtt)),
            None => (file, None),
        };

        let index: i64 = index
            .parse()
            .map_err(|_| GatewayError::validation(format!("Invalid file index: {file}")))?;
        let file_index = usize::try_from(index).map_err(|_| {
            GatewayError::validation(format!("File index must not be negative: {index}"))
        })?;

        Ok(Self {
            session_id,
            file_index,
            format: suffix_hint.or_else(|| format.and_then(FormatHint::from_query)),
        })
    }
}

/// Parses a session id from a path segment. Anything that is not a
/// fingerprint cannot name a live session.
///
/// # Errors
/// - `GatewayError::SessionNotFound` - Not 40 hex characters
pub fn parse_session_id(raw: &str) -> Result<SessionId> {
    Fingerprint::from_hex(raw).map_err(|_| GatewayError::SessionNotFound {
        session_id: raw.to_string(),
    })
}

/// One entry of a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListing {
    pub index: usize,
    pub name: String,
    pub size: u64,
}

/// Prepared response content.
pub enum StreamBody {
    /// File bytes, served with byte-range support
    Raw {
        reader: Box<dyn ContentReader>,
        length: u64,
        media_type: MediaType,
        file_name: String,
    },
    /// Fully buffered transcoded subtitle
    Transcoded { body: String, media_type: MediaType },
}

impl std::fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamBody::Raw {
                length,
                media_type,
                file_name,
                ..
            } => f
                .debug_struct("Raw")
                .field("length", length)
                .field("media_type", media_type)
                .field("file_name", file_name)
                .finish_non_exhaustive(),
            StreamBody::Transcoded { body, media_type } => f
                .debug_struct("Transcoded")
                .field("len", &body.len())
                .field("media_type", media_type)
                .finish(),
        }
    }
}

impl StreamBody {
    pub fn media_type(&self) -> MediaType {
        match self {
            StreamBody::Raw { media_type, .. } | StreamBody::Transcoded { media_type, .. } => {
                *media_type
            }
        }
    }
}

/// Serves listings and stream bodies for registry sessions.
#[derive(Debug, Clone)]
pub struct StreamingService {
    registry: Arc<SessionRegistry>,
    metadata_wait: Duration,
    subtitle_size_cap: u64,
}

impl StreamingService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        sessions: &SessionConfig,
        streaming: &StreamingConfig,
    ) -> Self {
        Self {
            registry,
            metadata_wait: sessions.stream_metadata_timeout,
            subtitle_size_cap: streaming.subtitle_size_cap,
        }
    }

    /// Lists the files of a session, waiting briefly for metadata.
    ///
    /// # Errors
    /// - `GatewayError::SessionNotFound` - Unknown session
    /// - `GatewayError::Timeout` - Metadata still unresolved after the wait
    pub async fn list_files(&self, id: &SessionId) -> Result<Vec<FileListing>> {
        let session = self.registry.lookup(id)?;
        let metadata = self.resolved_metadata(&session).await?;

        Ok(metadata
            .files
            .iter()
            .map(|file| FileListing {
                index: file.index,
                name: file.path.clone(),
                size: file.length,
            })
            .collect())
    }

    /// Opens the requested file, transcoding subtitles when asked to.
    ///
    /// # Errors
    /// - `GatewayError::SessionNotFound` - Unknown session
    /// - `GatewayError::Validation` - File index out of range
    /// - `GatewayError::Timeout` - Metadata still unresolved after the wait
    /// - `GatewayError::Upstream` / `GatewayError::Io` - Reading failed
    pub async fn open_stream(&self, request: &StreamRequest) -> Result<StreamBody> {
        let session = self.registry.lookup(&request.session_id)?;
        let metadata = self.resolved_metadata(&session).await?;
        let file = metadata.file(request.file_index)?.clone();

        let extension = file.extension();
        let reader = session.engine().open_file(file.index).await?;

        if request.format == Some(FormatHint::Vtt)
            && content_type::is_transcodable_subtitle(extension.as_deref())
        {
            let source = subtitles::read_capped(reader, self.subtitle_size_cap).await?;
            if source.len() as u64 == self.subtitle_size_cap && file.length > self.subtitle_size_cap
            {
                warn!(
                    file = %file.path,
                    size = file.length,
                    cap = self.subtitle_size_cap,
                    "Subtitle truncated at size cap"
                );
            }
            debug!(
                session_id = %request.session_id,
                file = %file.path,
                "Transcoding subtitle to WebVTT"
            );
            return Ok(StreamBody::Transcoded {
                body: subtitles::srt_to_vtt(&source),
                media_type: content_type::WEBVTT,
            });
        }

        info!(
            session_id = %request.session_id,
            file = %file.path,
            size = file.length,
            "Streaming file"
        );
        Ok(StreamBody::Raw {
            reader,
            length: file.length,
            media_type: content_type::for_extension(extension.as_deref()),
            file_name: file.file_name().to_string(),
        })
    }

    async fn resolved_metadata(&self, session: &Session) -> Result<Arc<ContentMetadata>> {
        if let Some(metadata) = session.engine().metadata() {
            return Ok(metadata);
        }

        match tokio::time::timeout(self.metadata_wait, session.engine().wait_for_metadata()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    session_id = %session.id(),
                    waited_secs = self.metadata_wait.as_secs(),
                    "Metadata still unresolved; a proxy may be blocking transfer traffic"
                );
                Err(GatewayError::Timeout {
                    operation: "content metadata",
                    waited: self.metadata_wait,
                    session_id: Some(session.id()),
                })
            }
        }
    }
}
