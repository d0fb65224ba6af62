//! Byte-range responses for file streaming
//!
//! `Range` headers are parsed and validated by `http-range-header`, the
//! parser behind `tower-http`'s `ServeDir`, and answered the way `ServeDir`
//! answers them: one satisfiable range is 206, any other range request is
//! 416. The reader is moved into the response stream and dropped when it
//! ends or the client goes away.

use std::io::SeekFrom;
use std::ops::RangeInclusive;

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::http::response::Builder;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use http_range_header::RangeUnsatisfiableError;
use shoal_core::engine::ContentReader;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::error::ApiError;

fn parse_ranges(
    header: Option<&str>,
    total: u64,
) -> Option<Result<Vec<RangeInclusive<u64>>, RangeUnsatisfiableError>> {
    header.map(|value| {
        http_range_header::parse_range_header(value).and_then(|parsed| parsed.validate(total))
    })
}

/// Builds a streaming response for `reader`, honoring `range`.
///
/// # Errors
/// - `ApiError` (500) - Seeking the reader failed
pub async fn serve_range(
    mut reader: Box<dyn ContentReader>,
    total: u64,
    content_type: &'static str,
    range: Option<&HeaderValue>,
) -> Result<Response, ApiError> {
    let header = range.and_then(|value| value.to_str().ok());
    let ranges = parse_ranges(header, total);
    debug!(?header, ?ranges, total, "Parsed byte range");

    let builder = Response::builder().header(ACCEPT_RANGES, "bytes");

    let response = match ranges {
        None => builder
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(Body::from_stream(ReaderStream::new(reader.take(total)))),
        Some(_) if total == 0 => {
            unsatisfiable(builder, total, "Cannot serve ranges of an empty file")
        }
        Some(Ok(ranges)) if ranges.len() > 1 => {
            unsatisfiable(builder, total, "Cannot serve multipart range requests")
        }
        Some(Ok(mut ranges)) => {
            let range = ranges.remove(0);
            let (start, end) = (*range.start(), *range.end());
            reader
                .seek(SeekFrom::Start(start))
                .await
                .map_err(|e| ApiError::internal(format!("Failed to seek to byte {start}: {e}")))?;
            let length = end - start + 1;
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(CONTENT_TYPE, content_type)
                .header(CONTENT_LENGTH, length)
                .header(CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
                .body(Body::from_stream(ReaderStream::new(reader.take(length))))
        }
        Some(Err(e)) => unsatisfiable(builder, total, &e.to_string()),
    };

    response.map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

fn unsatisfiable(
    builder: Builder,
    total: u64,
    reason: &str,
) -> Result<Response, axum::http::Error> {
    builder
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(CONTENT_RANGE, format!("bytes */{total}"))
        .body(Body::from(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::to_bytes;

    use super::*;

    async fn serve(header: Option<&'static str>) -> Response {
        let reader: Box<dyn ContentReader> = Box::new(Cursor::new(b"0123456789".to_vec()));
        let range = header.map(HeaderValue::from_static);
        serve_range(reader, 10, "video/mp4", range.as_ref())
            .await
            .unwrap()
    }

    async fn body(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_serve_without_range_is_full_body() {
        let response = serve(None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
        assert_eq!(body(response).await, b"0123456789");
    }

    #[tokio::test]
    async fn test_serve_partial_content() {
        let response = serve(Some("bytes=2-5")).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(response.headers()[CONTENT_LENGTH], "4");
        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
        assert_eq!(body(response).await, b"2345");
    }

    #[tokio::test]
    async fn test_open_end_suffix_and_clamped_ranges() {
        for (header, expected_range, expected_body) in [
            ("bytes=7-", "bytes 7-9/10", &b"789"[..]),
            ("bytes=-3", "bytes 7-9/10", &b"789"[..]),
            ("bytes=8-500", "bytes 8-9/10", &b"89"[..]),
        ] {
            let response = serve(Some(header)).await;
            assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT, "{header}");
            assert_eq!(response.headers()[CONTENT_RANGE], expected_range);
            assert_eq!(body(response).await, expected_body);
        }
    }

    #[tokio::test]
    async fn test_unservable_ranges_are_416() {
        for header in [
            "bytes=50-",
            "bytes=-0",
            "bytes=9-3",
            "bytes=abc-",
            "items=0-1",
            "bytes=0-1,5-6",
        ] {
            let response = serve(Some(header)).await;
            assert_eq!(
                response.status(),
                StatusCode::RANGE_NOT_SATISFIABLE,
                "{header}"
            );
            assert_eq!(response.headers()[CONTENT_RANGE], "bytes */10");
        }
    }

    #[tokio::test]
    async fn test_empty_file_rejects_any_range() {
        let reader: Box<dyn ContentReader> = Box::new(Cursor::new(Vec::new()));
        let range = HeaderValue::from_static("bytes=0-");

        let response = serve_range(reader, 0, "text/plain", Some(&range))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */0");
    }
}
