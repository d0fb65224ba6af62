//! Torrent metainfo files to magnet URIs.

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::{GatewayError, Result};

/// Builds a magnet URI from the bytes of a `.torrent` file.
///
/// The info hash is the SHA-1 of the bencoded `info` dictionary. Trackers
/// come from `announce-list` (all tiers, first occurrence kept), falling
/// back to `announce`.
///
/// # Errors
/// - `GatewayError::Validation` - Not bencode, or no `info` dictionary
pub fn torrent_to_magnet(torrent: &[u8]) -> Result<String> {
    let root: Value = serde_bencode::from_bytes(torrent)
        .map_err(|e| GatewayError::validation(format!("Invalid torrent file: {e}")))?;

    let Value::Dict(root) = root else {
        return Err(GatewayError::validation(
            "Invalid torrent file: root is not a dictionary",
        ));
    };

    let info = root
        .get(b"info".as_slice())
        .filter(|info| matches!(info, Value::Dict(_)))
        .ok_or_else(|| GatewayError::validation("Invalid torrent file: missing info dictionary"))?;

    let encoded_info = serde_bencode::to_bytes(info)
        .map_err(|e| GatewayError::validation(format!("Invalid torrent file: {e}")))?;
    let info_hash = hex::encode(Sha1::digest(&encoded_info));

    let mut magnet = format!("magnet:?xt=urn:btih:{info_hash}");

    if let Value::Dict(info) = info
        && let Some(Value::Bytes(name)) = info.get(b"name".as_slice())
    {
        magnet.push_str("&dn=");
        magnet.push_str(&urlencoding::encode(&String::from_utf8_lossy(name)));
    }

    for tracker in trackers(&root) {
        magnet.push_str("&tr=");
        magnet.push_str(&urlencoding::encode(&tracker));
    }

    debug!(%info_hash, "Converted torrent file to magnet");
    Ok(magnet)
}

fn trackers(root: &std::collections::HashMap<Vec<u8>, Value>) -> Vec<String> {
    let mut trackers: Vec<String> = Vec::new();

    if let Some(Value::List(tiers)) = root.get(b"announce-list".as_slice()) {
        let urls = tiers.iter().flat_map(|tier| match tier {
            Value::List(urls) => urls.as_slice(),
            _ => &[] as &[Value],
        });
        for url in urls {
            if let Value::Bytes(url) = url {
                let url = String::from_utf8_lossy(url).into_owned();
                if !trackers.contains(&url) {
                    trackers.push(url);
                }
            }
        }
    }

    if trackers.is_empty()
        && let Some(Value::Bytes(announce)) = root.get(b"announce".as_slice())
    {
        trackers.push(String::from_utf8_lossy(announce).into_owned());
    }

    trackers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ContentLocator;

    const INFO: &[u8] =
        b"d6:lengthi5e4:name9:hello.txt12:piece lengthi16384e6:pieces20:abcdefghijabcdefghije";
    const INFO_HASH: &str = "6025c32c17ad699ae09162c7adcfba358ae39636";

    fn torrent(prefix: &[u8]) -> Vec<u8> {
        let mut bytes = b"d".to_vec();
        bytes.extend_from_slice(prefix);
        bytes.extend_from_slice(b"4:info");
        bytes.extend_from_slice(INFO);
        bytes.push(b'e');
        bytes
    }

    #[test]
    fn test_magnet_from_announce_list() {
        let bytes = torrent(
            b"8:announce22:udp://t.example:1337/a13:announce-listll22:udp://t.example:1337/ael18:http://b.example/aee",
        );

        let magnet = torrent_to_magnet(&bytes).unwrap();

        assert_eq!(
            magnet,
            format!(
                "magnet:?xt=urn:btih:{INFO_HASH}&dn=hello.txt\
                 &tr=udp%3A%2F%2Ft.example%3A1337%2Fa&tr=http%3A%2F%2Fb.example%2Fa"
            )
        );

        let locator = ContentLocator::parse(&magnet).unwrap();
        assert_eq!(locator.fingerprint().to_string(), INFO_HASH);
        assert_eq!(locator.display_name(), Some("hello.txt"));
        assert_eq!(locator.trackers().len(), 2);
    }

    #[test]
    fn test_announce_fallback() {
        let bytes = torrent(b"8:announce18:http://b.example/a");
        let magnet = torrent_to_magnet(&bytes).unwrap();
        assert!(magnet.ends_with("&tr=http%3A%2F%2Fb.example%2Fa"));
    }

    #[test]
    fn test_rejects_invalid_torrents() {
        for bytes in [
            b"not bencode".as_slice(),
            b"i42e".as_slice(),
            b"d8:announce3:abce".as_slice(),
            b"d4:info3:abce".as_slice(),
        ] {
            let err = torrent_to_magnet(bytes).unwrap_err();
            assert!(err.is_user_error());
        }
    }
}
