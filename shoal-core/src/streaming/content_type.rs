//! Extension to MIME type table for streamed files.

/// Response type for a streamed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub mime: &'static str,
    /// Subtitle responses are readable cross-origin by `<track>` elements
    pub subtitle: bool,
}

impl MediaType {
    const fn video(mime: &'static str) -> Self {
        Self {
            mime,
            subtitle: false,
        }
    }

    const fn subtitle(mime: &'static str) -> Self {
        Self {
            mime,
            subtitle: true,
        }
    }
}

pub const OCTET_STREAM: MediaType = MediaType::video("application/octet-stream");
pub const WEBVTT: MediaType = MediaType::subtitle("text/vtt");

/// Looks up the media type for a lowercase extension (without the dot).
pub fn for_extension(extension: Option<&str>) -> MediaType {
    match extension {
        Some("mp4") => MediaType::video("video/mp4"),
        Some("webm") => MediaType::video("video/webm"),
        Some("mkv") => MediaType::video("video/x-matroska"),
        Some("avi") => MediaType::video("video/x-msvideo"),
        Some("srt") | Some("sub") => MediaType::subtitle("text/plain"),
        Some("vtt") => WEBVTT,
        _ => OCTET_STREAM,
    }
}

/// Whether files with this extension can be transcoded to WebVTT.
pub fn is_transcodable_subtitle(extension: Option<&str>) -> bool {
    extension == Some("srt")
}
