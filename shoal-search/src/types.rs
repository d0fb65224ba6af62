//! Search result shape and field remapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One indexer result in the shape the browser client consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Release title
    pub title: String,
    /// Magnet URI, when the indexer provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnet_url: Option<String>,
    /// Indexer download link, set only when no magnet is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Whether `magnet_url` can be added without resolving a download link
    pub direct_magnet: bool,
    /// Human-readable size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Seeder count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u64>,
    /// Leecher count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leechers: Option<u64>,
    /// Indexer or tracker that returned the release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer: Option<String>,
    /// Publication date as reported upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    /// Category label as reported upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Source field names for one indexer's result records.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    /// Title field
    pub title: &'static str,
    /// Download link field
    pub download_url: &'static str,
    /// Magnet field
    pub magnet_url: &'static str,
    /// Size in bytes field
    pub size: &'static str,
    /// Seeders field
    pub seeders: &'static str,
    /// Leechers field
    pub leechers: &'static str,
    /// Indexer name field
    pub indexer: &'static str,
    /// Publish date field
    pub publish_date: &'static str,
    /// Category field
    pub category: &'static str,
    /// Only accept magnet values that start with `magnet:`
    pub strict_magnet: bool,
}

impl FieldMap {
    /// Remaps one upstream record. Records without a title, or with neither
    /// a magnet nor a download link, yield `None`.
    pub fn remap(&self, record: &Value) -> Option<SearchResult> {
        let title = non_empty_str(record, self.title)?;

        let magnet_url = non_empty_str(record, self.magnet_url)
            .filter(|magnet| !self.strict_magnet || magnet.starts_with("magnet:"));
        let download_url = non_empty_str(record, self.download_url);
        if magnet_url.is_none() && download_url.is_none() {
            return None;
        }

        let direct_magnet = magnet_url.is_some();
        Some(SearchResult {
            title,
            download_url: if direct_magnet { None } else { download_url },
            magnet_url,
            direct_magnet,
            size: number(record, self.size).map(format_size),
            seeders: count(record, self.seeders),
            leechers: count(record, self.leechers),
            indexer: string(record, self.indexer),
            publish_date: string(record, self.publish_date),
            category: string(record, self.category),
        })
    }
}

fn string(record: &Value, field: &str) -> Option<String> {
    record.get(field)?.as_str().map(str::to_string)
}

fn non_empty_str(record: &Value, field: &str) -> Option<String> {
    string(record, field).filter(|s| !s.is_empty())
}

fn number(record: &Value, field: &str) -> Option<f64> {
    record.get(field)?.as_f64()
}

fn count(record: &Value, field: &str) -> Option<u64> {
    let value = record.get(field)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Formats a byte count: whole bytes below 1 KiB, otherwise KB, MB or GB
/// with two decimals.
pub fn format_size(bytes: f64) -> String {
    const UNIT: f64 = 1024.0;

    if bytes < UNIT {
        return format!("{bytes:.0} B");
    }
    let kb = bytes / UNIT;
    if kb < UNIT {
        return format!("{kb:.2} KB");
    }
    let mb = kb / UNIT;
    if mb < UNIT {
        return format!("{mb:.2} MB");
    }
    format!("{:.2} GB", mb / UNIT)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const MAP: FieldMap = FieldMap {
        title: "title",
        download_url: "downloadUrl",
        magnet_url: "magnetUrl",
        size: "size",
        seeders: "seeders",
        leechers: "leechers",
        indexer: "indexer",
        publish_date: "publishDate",
        category: "category",
        strict_magnet: false,
    };

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(512.0), "512 B");
        assert_eq!(format_size(1536.0), "1.50 KB");
        assert_eq!(format_size(5.0 * 1024.0 * 1024.0), "5.00 MB");
        assert_eq!(format_size(1.5 * 1024.0 * 1024.0 * 1024.0), "1.50 GB");
    }

    #[test]
    fn test_magnet_preferred_over_download_link() {
        let record = json!({
            "title": "Big Buck Bunny",
            "magnetUrl": "magnet:?xt=urn:btih:abc",
            "downloadUrl": "http://indexer/dl/1",
            "size": 2048,
            "seeders": 12,
            "leechers": 3.0,
            "indexer": "Public",
        });

        let result = MAP.remap(&record).unwrap();

        assert!(result.direct_magnet);
        assert_eq!(result.magnet_url.as_deref(), Some("magnet:?xt=urn:btih:abc"));
        assert_eq!(result.download_url, None);
        assert_eq!(result.size.as_deref(), Some("2.00 KB"));
        assert_eq!(result.seeders, Some(12));
        assert_eq!(result.leechers, Some(3));
        assert_eq!(result.category, None);
    }

    #[test]
    fn test_download_link_used_without_magnet() {
        let record = json!({"title": "Sintel", "downloadUrl": "http://indexer/dl/2"});
        let result = MAP.remap(&record).unwrap();

        assert!(!result.direct_magnet);
        assert_eq!(result.download_url.as_deref(), Some("http://indexer/dl/2"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["directMagnet"], false);
        assert!(json.get("magnetUrl").is_none());
    }

    #[test]
    fn test_incomplete_records_are_dropped() {
        assert!(MAP.remap(&json!({"title": "", "magnetUrl": "magnet:?x"})).is_none());
        assert!(MAP.remap(&json!({"title": "No links"})).is_none());
        assert!(MAP.remap(&json!({"magnetUrl": "magnet:?x"})).is_none());
    }

    #[test]
    fn test_strict_magnet_rejects_non_magnet_values() {
        let strict = FieldMap {
            strict_magnet: true,
            ..MAP
        };
        let record = json!({"title": "T", "magnetUrl": "http://not-a-magnet"});
        assert!(strict.remap(&record).is_none());
    }
}
