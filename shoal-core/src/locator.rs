//! Content locators and fingerprints.
//!
//! A locator is the magnet-style URI a client submits; its fingerprint is
//! the 20-byte info hash, which keys the session registry.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{LOCATION, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};
use url::Url;

use crate::GatewayError;

/// Stable content identifier (BitTorrent info hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Creates a fingerprint from raw hash bytes.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns the underlying hash bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses 40 hex characters.
    ///
    /// # Errors
    /// - `GatewayError::Validation` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, GatewayError> {
        let mut hash = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut hash)
            .map_err(|e| GatewayError::validation(format!("Invalid fingerprint {hex_str}: {e}")))?;
        Ok(Self(hash))
    }

    /// Parses a `btih` value in either 40-char hex or 32-char base32 form.
    ///
    /// # Errors
    /// - `GatewayError::Validation` - Neither encoding applies
    pub fn from_btih(value: &str) -> Result<Self, GatewayError> {
        match value.len() {
            40 => Self::from_hex(value),
            32 => decode_base32(value).map(Self).ok_or_else(|| {
                GatewayError::validation(format!("Invalid base32 info hash: {value}"))
            }),
            len => Err(GatewayError::validation(format!(
                "Invalid info hash length: {len} (expected 40 hex or 32 base32 characters)"
            ))),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// RFC 4648 base32 without padding, 32 characters to 20 bytes.
fn decode_base32(value: &str) -> Option<[u8; 20]> {
    let mut out = [0u8; 20];
    let mut buffer: u64 = 0;
    let mut bits = 0;
    let mut written = 0;

    for c in value.bytes() {
        let digit = match c.to_ascii_uppercase() {
            c @ b'A'..=b'Z' => c - b'A',
            c @ b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(digit);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out[written] = (buffer >> bits) as u8;
            written += 1;
        }
    }

    (written == 20).then_some(out)
}

/// Parsed magnet-style content locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLocator {
    fingerprint: Fingerprint,
    display_name: Option<String>,
    trackers: Vec<String>,
}

impl ContentLocator {
    /// Parses a magnet URI.
    ///
    /// # Errors
    /// - `GatewayError::Validation` - Empty input, not a magnet URI, or no
    ///   usable `xt=urn:btih:` topic
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GatewayError::validation("No magnet link provided"));
        }
        if !raw.starts_with("magnet:") {
            return Err(GatewayError::validation("Invalid magnet link"));
        }

        let url = Url::parse(raw)
            .map_err(|e| GatewayError::validation(format!("Invalid magnet link: {e}")))?;

        let mut fingerprint = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if fingerprint.is_none() => {
                    if let Some(btih) = value.strip_prefix("urn:btih:") {
                        fingerprint = Some(Fingerprint::from_btih(btih)?);
                    }
                }
                "dn" => display_name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let fingerprint = fingerprint.ok_or_else(|| {
            GatewayError::validation("Magnet link is missing an xt=urn:btih: info hash")
        })?;

        Ok(Self {
            fingerprint,
            display_name,
            trackers,
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }
}

/// Whether the submitted locator is an indexer download link rather than a
/// magnet URI.
pub fn is_download_link(raw: &str) -> bool {
    let raw = raw.trim_start();
    raw.starts_with("http://") || raw.starts_with("https://")
}

/// Follows an indexer download link to the magnet URI it redirects to.
///
/// `client` must not follow redirects itself; the `Location` of the first
/// 3xx response is inspected directly.
///
/// # Errors
/// - `GatewayError::Validation` - Link is malformed, unreachable, or does
///   not redirect to a magnet URI
pub async fn resolve_download_link(
    client: &reqwest::Client,
    link: &str,
    user_agent: &str,
) -> Result<String, GatewayError> {
    let url = Url::parse(link.trim())
        .map_err(|e| GatewayError::validation(format!("Invalid URL: {e}")))?;

    info!(%url, "Following indexer download link");
    let response = client
        .get(url)
        .header(USER_AGENT, user_agent)
        .send()
        .await
        .map_err(|e| GatewayError::validation(format!("Failed to download: {e}")))?;

    debug!(status = %response.status(), "Indexer link responded");
    if !response.status().is_redirection() {
        return Err(GatewayError::validation(
            "URL does not redirect to a magnet link",
        ));
    }

    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if location.starts_with("magnet:") {
        info!("Indexer link redirected to magnet");
        Ok(location.to_string())
    } else {
        Err(GatewayError::validation(
            "URL redirects to non-magnet content",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_HASH: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    #[test]
    fn test_parse_hex_magnet() {
        let magnet = format!(
            "magnet:?xt=urn:btih:{HEX_HASH}&dn=Big+Buck+Bunny&tr=udp%3A%2F%2Ftracker.example%3A1337"
        );
        let locator = ContentLocator::parse(&magnet).unwrap();

        assert_eq!(locator.fingerprint().to_string(), HEX_HASH);
        assert_eq!(locator.display_name(), Some("Big Buck Bunny"));
        assert_eq!(locator.trackers(), ["udp://tracker.example:1337"]);
    }

    #[test]
    fn test_uppercase_hex_normalizes_to_lowercase() {
        let magnet = format!("magnet:?xt=urn:btih:{}", HEX_HASH.to_uppercase());
        let locator = ContentLocator::parse(&magnet).unwrap();
        assert_eq!(locator.fingerprint().to_string(), HEX_HASH);
    }

    #[test]
    fn test_parse_base32_magnet() {
        // Base32 of the same 20 bytes as HEX_HASH.
        let magnet = "magnet:?xt=urn:btih:YEX6DQDLXISUVHOJ6UM3GNNKPQJWPKEK";
        let locator = ContentLocator::parse(magnet).unwrap();
        assert_eq!(locator.fingerprint().to_string(), HEX_HASH);
    }

    #[test]
    fn test_rejects_invalid_locators() {
        for raw in [
            "",
            "   ",
            "not a magnet",
            "magnet:?dn=missing-hash",
            "magnet:?xt=urn:btih:1234",
            "magnet:?xt=urn:btih:zz2fe1c06bba254a9dc9f519b335aa7c1367a88a",
        ] {
            let err = ContentLocator::parse(raw).unwrap_err();
            assert!(err.is_user_error(), "{raw:?} should be a validation error");
        }
    }

    #[test]
    fn test_fingerprint_roundtrips_through_display() {
        let fingerprint = Fingerprint::from_hex(HEX_HASH).unwrap();
        let parsed: Fingerprint = fingerprint.to_string().parse().unwrap();
        assert_eq!(parsed, fingerprint);
    }

    #[test]
    fn test_download_link_detection() {
        assert!(is_download_link("http://prowlarr:9696/download?id=1"));
        assert!(is_download_link("https://indexer/x"));
        assert!(!is_download_link("magnet:?xt=urn:btih:abc"));
    }
}
