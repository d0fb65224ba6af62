//! Centralized configuration for Shoal.
//!
//! Runtime tunables live here so timeouts and limits are not scattered
//! across the codebase. Persisted user settings (proxy, indexers) are a
//! separate concern handled by [`crate::settings`].

use std::net::SocketAddr;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Shoal components.
#[derive(Debug, Clone, Default)]
pub struct ShoalConfig {
    pub sessions: SessionConfig,
    pub ports: PortConfig,
    pub streaming: StreamingConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
}

/// Session lifecycle timing.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on metadata resolution while adding content
    pub metadata_timeout: Duration,
    /// Upper bound on metadata resolution while serving a listing or stream
    pub stream_metadata_timeout: Duration,
    /// Idle time after which a session is eligible for eviction
    pub idle_ttl: Duration,
    /// Interval between reaper sweeps
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(180),
            stream_metadata_timeout: Duration::from_secs(30),
            idle_ttl: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Listen port ranges handed to engine instances.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Range checked against the in-use set
    pub primary: Range<u16>,
    /// Last-resort range, not checked for uniqueness
    pub fallback: Range<u16>,
    /// Random draws from `primary` before falling back
    pub max_attempts: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            primary: 10_000..60_000,
            fallback: 60_000..65_000,
            max_attempts: 50,
        }
    }
}

/// Streaming limits.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Largest subtitle file read into memory for transcoding
    pub subtitle_size_cap: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            subtitle_size_cap: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

/// Outbound HTTP behaviour for control traffic.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Total timeout for control-traffic requests
    pub control_timeout: Duration,
    /// Idle pooled connection lifetime
    pub pool_idle_timeout: Duration,
    /// Timeout for the proxy connectivity probe
    pub probe_timeout: Duration,
    /// URL fetched through a proxy to verify it works
    pub probe_url: String,
    /// User agent for control-traffic requests
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            control_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            probe_url: "https://httpbin.org/ip".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        }
    }
}

/// HTTP server and on-disk locations.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub settings_path: PathBuf,
    pub data_dir: PathBuf,
    pub client_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3347)),
            settings_path: PathBuf::from("config/settings.json"),
            data_dir: PathBuf::from("./torrent-data"),
            client_dir: PathBuf::from("./client"),
        }
    }
}

impl ShoalConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seconds) = env_u64("SHOAL_METADATA_TIMEOUT") {
            config.sessions.metadata_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_u64("SHOAL_IDLE_TTL") {
            config.sessions.idle_ttl = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_u64("SHOAL_SWEEP_INTERVAL") {
            config.sessions.sweep_interval = Duration::from_secs(seconds);
        }

        if let Ok(addr) = std::env::var("SHOAL_BIND")
            && let Ok(addr) = addr.parse()
        {
            config.server.bind_addr = addr;
        }

        if let Ok(dir) = std::env::var("SHOAL_DATA_DIR") {
            config.server.data_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("SHOAL_SETTINGS") {
            config.server.settings_path = PathBuf::from(path);
        }

        config
    }

    /// Creates a configuration with short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            sessions: SessionConfig {
                metadata_timeout: Duration::from_millis(500),
                stream_metadata_timeout: Duration::from_millis(200),
                idle_ttl: Duration::from_secs(60),
                sweep_interval: Duration::from_secs(10),
            },
            ..Default::default()
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ShoalConfig::default();

        assert_eq!(config.sessions.metadata_timeout, Duration::from_secs(180));
        assert_eq!(config.sessions.idle_ttl, Duration::from_secs(900));
        assert_eq!(config.sessions.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.ports.primary, 10_000..60_000);
        assert_eq!(config.ports.max_attempts, 50);
        assert_eq!(config.streaming.subtitle_size_cap, 10 * 1024 * 1024);
        assert_eq!(config.server.bind_addr.port(), 3347);
    }

    #[test]
    fn test_port_ranges_are_disjoint() {
        let ports = PortConfig::default();
        assert!(ports.primary.end <= ports.fallback.start);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("SHOAL_IDLE_TTL", "60");
            std::env::set_var("SHOAL_BIND", "127.0.0.1:4000");
        }

        let config = ShoalConfig::from_env();

        assert_eq!(config.sessions.idle_ttl, Duration::from_secs(60));
        assert_eq!(config.server.bind_addr, "127.0.0.1:4000".parse().unwrap());

        unsafe {
            std::env::remove_var("SHOAL_IDLE_TTL");
            std::env::remove_var("SHOAL_BIND");
        }
    }
}
