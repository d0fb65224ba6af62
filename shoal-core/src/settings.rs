//! Persisted user settings: proxy and indexer configuration.
//!
//! The file uses flat camelCase keys so existing `settings.json` files and
//! the browser client keep working. In memory the value is immutable; an
//! update builds a new [`Settings`], persists it, and swaps it in together
//! with a bumped generation number. Neither readers nor writers hold the
//! snapshot lock across I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Errors from loading or saving the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Settings file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Complete persisted option set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enable_proxy: bool,
    pub proxy_url: String,
    pub enable_prowlarr: bool,
    pub prowlarr_host: String,
    pub prowlarr_api_key: String,
    pub enable_jackett: bool,
    pub jackett_host: String,
    pub jackett_api_key: String,
}

/// Proxy portion of the settings, also the body of the proxy settings
/// endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxySettings {
    pub enable_proxy: bool,
    pub proxy_url: String,
}

/// Prowlarr portion of the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProwlarrSettings {
    pub enable_prowlarr: bool,
    pub prowlarr_host: String,
    pub prowlarr_api_key: String,
}

/// Jackett portion of the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JackettSettings {
    pub enable_jackett: bool,
    pub jackett_host: String,
    pub jackett_api_key: String,
}

/// Connection details for one metadata service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerEndpoint {
    pub enabled: bool,
    pub host: String,
    pub api_key: String,
}

impl Settings {
    pub fn proxy(&self) -> ProxySettings {
        ProxySettings {
            enable_proxy: self.enable_proxy,
            proxy_url: self.proxy_url.clone(),
        }
    }

    pub fn prowlarr(&self) -> IndexerEndpoint {
        IndexerEndpoint {
            enabled: self.enable_prowlarr,
            host: self.prowlarr_host.clone(),
            api_key: self.prowlarr_api_key.clone(),
        }
    }

    pub fn jackett(&self) -> IndexerEndpoint {
        IndexerEndpoint {
            enabled: self.enable_jackett,
            host: self.jackett_host.clone(),
            api_key: self.jackett_api_key.clone(),
        }
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.enable_proxy = proxy.enable_proxy;
        self.proxy_url = proxy.proxy_url;
        self
    }

    pub fn with_prowlarr(mut self, prowlarr: ProwlarrSettings) -> Self {
        self.enable_prowlarr = prowlarr.enable_prowlarr;
        self.prowlarr_host = prowlarr.prowlarr_host;
        self.prowlarr_api_key = prowlarr.prowlarr_api_key;
        self
    }

    pub fn with_jackett(mut self, jackett: JackettSettings) -> Self {
        self.enable_jackett = jackett.enable_jackett;
        self.jackett_host = jackett.jackett_host;
        self.jackett_api_key = jackett.jackett_api_key;
        self
    }
}

impl From<ProwlarrSettings> for IndexerEndpoint {
    fn from(settings: ProwlarrSettings) -> Self {
        Self {
            enabled: settings.enable_prowlarr,
            host: settings.prowlarr_host,
            api_key: settings.prowlarr_api_key,
        }
    }
}

impl From<JackettSettings> for IndexerEndpoint {
    fn from(settings: JackettSettings) -> Self {
        Self {
            enabled: settings.enable_jackett,
            host: settings.jackett_host,
            api_key: settings.jackett_api_key,
        }
    }
}

/// Settings snapshot tagged with the generation it was published under.
#[derive(Debug, Clone)]
pub struct SettingsSnapshot {
    pub generation: u64,
    pub settings: Arc<Settings>,
}

/// Shared, atomically swappable settings value.
///
/// Cheap to clone; clones observe the same value.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    current: Arc<RwLock<SettingsSnapshot>>,
    writer: Arc<Mutex<()>>,
    path: Option<Arc<PathBuf>>,
}

impl SettingsStore {
    /// Creates a store that never touches disk.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            current: Arc::new(RwLock::new(SettingsSnapshot {
                generation: 0,
                settings: Arc::new(settings),
            })),
            writer: Arc::new(Mutex::new(())),
            path: None,
        }
    }

    /// Loads settings from `path`, writing defaults first if the file does
    /// not exist.
    ///
    /// # Errors
    /// - `SettingsError::Read` - File exists but cannot be read
    /// - `SettingsError::Write` - Defaults could not be written
    /// - `SettingsError::Corrupt` - File is not valid settings JSON
    pub fn load_or_init(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();

        let settings = if path.exists() {
            let raw = std::fs::read(&path).map_err(|source| SettingsError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&raw).map_err(|source| SettingsError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            info!(path = %path.display(), "Settings file not found, creating defaults");
            let defaults = Settings::default();
            write_settings(&path, &defaults)?;
            defaults
        };

        Ok(Self {
            current: Arc::new(RwLock::new(SettingsSnapshot {
                generation: 0,
                settings: Arc::new(settings),
            })),
            writer: Arc::new(Mutex::new(())),
            path: Some(Arc::new(path)),
        })
    }

    /// Current settings value.
    pub fn current(&self) -> Arc<Settings> {
        self.current.read().settings.clone()
    }

    /// Current settings value with its generation.
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.current.read().clone()
    }

    /// Generation of the current value; bumps on every update.
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Replaces the settings with `apply(current)`, persisting before the
    /// swap. On a persistence failure the in-memory value is unchanged.
    ///
    /// # Errors
    /// - `SettingsError::Write` - Settings file could not be written
    pub fn update(
        &self,
        apply: impl FnOnce(Settings) -> Settings,
    ) -> Result<SettingsSnapshot, SettingsError> {
        // Updates are serialized on `writer`; persisted order matches
        // publish order. The snapshot lock is only taken for the swap.
        let _writer = self.writer.lock();
        let base = self.snapshot();
        let next = apply(base.settings.as_ref().clone());

        if let Some(path) = &self.path {
            write_settings(path, &next)?;
        }

        let published = SettingsSnapshot {
            generation: base.generation + 1,
            settings: Arc::new(next),
        };
        *self.current.write() = published.clone();
        Ok(published)
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let write_error = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let json = serde_json::to_vec_pretty(settings)
        .map_err(|e| write_error(std::io::Error::other(e)))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(write_error)?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        warn!(path = %path.display(), "Failed to move settings into place");
        write_error(e)
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config").join("settings.json");

        let store = SettingsStore::load_or_init(&path).unwrap();

        assert!(path.exists());
        assert_eq!(*store.current(), Settings::default());
        let on_disk: Settings = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, Settings::default());
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let result = SettingsStore::load_or_init(&path);
        assert!(matches!(result, Err(SettingsError::Corrupt { .. })));
    }

    #[test]
    fn test_file_uses_flat_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            br#"{"enableProxy": true, "proxyUrl": "socks5://127.0.0.1:1080", "prowlarrApiKey": "k"}"#,
        )
        .unwrap();

        let store = SettingsStore::load_or_init(&path).unwrap();
        let settings = store.current();

        assert!(settings.enable_proxy);
        assert_eq!(settings.proxy_url, "socks5://127.0.0.1:1080");
        assert_eq!(settings.prowlarr_api_key, "k");
        assert!(!settings.enable_jackett);
    }

    #[test]
    fn test_update_persists_and_bumps_generation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::load_or_init(&path).unwrap();
        let before = store.snapshot();

        let after = store
            .update(|s| {
                s.with_jackett(JackettSettings {
                    enable_jackett: true,
                    jackett_host: "http://jackett:9117".to_string(),
                    jackett_api_key: "abc".to_string(),
                })
            })
            .unwrap();

        assert_eq!(after.generation, before.generation + 1);
        assert!(store.current().enable_jackett);
        assert!(before.settings.jackett_host.is_empty());

        let reloaded = SettingsStore::load_or_init(&path).unwrap();
        assert_eq!(reloaded.current().jackett_host, "http://jackett:9117");
    }

    #[test]
    fn test_readers_proceed_while_update_is_in_flight() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::load_or_init(dir.path().join("settings.json")).unwrap();

        let after = store
            .update(|s| {
                let seen = store.snapshot();
                assert_eq!(seen.generation, 0);
                assert!(!seen.settings.enable_proxy);
                s.with_proxy(ProxySettings {
                    enable_proxy: true,
                    proxy_url: "socks5://127.0.0.1:1080".to_string(),
                })
            })
            .unwrap();

        assert_eq!(after.generation, 1);
        assert!(store.current().enable_proxy);
    }

    #[test]
    fn test_snapshots_are_never_partially_written() {
        let store = SettingsStore::in_memory(Settings::default());

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..200 {
                        let url = format!("socks5://host{i}:{n}");
                        store
                            .update(|s| {
                                s.with_proxy(ProxySettings {
                                    enable_proxy: true,
                                    proxy_url: url.clone(),
                                })
                                .with_prowlarr(ProwlarrSettings {
                                    enable_prowlarr: true,
                                    prowlarr_host: url.clone(),
                                    prowlarr_api_key: url,
                                })
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..1000 {
            let snapshot = store.current();
            assert_eq!(snapshot.proxy_url, snapshot.prowlarr_host);
            assert_eq!(snapshot.proxy_url, snapshot.prowlarr_api_key);
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(store.generation(), 800);
    }
}
