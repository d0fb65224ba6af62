//! SubRip to WebVTT conversion.

use tokio::io::{AsyncRead, AsyncReadExt};

const WEBVTT_HEADER: &str = "WEBVTT\n\n";
const CUE_TIMING_DELIMITER: &str = " --> ";

/// Converts SubRip text to WebVTT.
///
/// Cue sequence numbers are dropped, timing lines switch the fraction
/// separator from `,` to `.`, and every other line passes through.
pub fn srt_to_vtt(srt: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(srt);
    let text: &str = &decoded;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut vtt = String::with_capacity(WEBVTT_HEADER.len() + text.len());
    vtt.push_str(WEBVTT_HEADER);

    for line in text.lines() {
        if is_sequence_number(line) {
            continue;
        }
        if line.contains(CUE_TIMING_DELIMITER) {
            vtt.push_str(&line.replace(',', "."));
        } else {
            vtt.push_str(line);
        }
        vtt.push('\n');
    }
    vtt
}

fn is_sequence_number(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Reads at most `cap` bytes from `reader`.
///
/// # Errors
/// - `std::io::Error` - Underlying read failed
pub async fn read_capped<R>(reader: R, cap: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    reader.take(cap).read_to_end(&mut buffer).await?;
    Ok(buffer)
}
