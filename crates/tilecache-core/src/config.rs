//! Application configuration management.
//!
//! This module handles loading and saving the configuration: the tile
//! source, cache retention, mount retry policy and network settings.
//!
//! Configuration is stored at `~/.config/tilecache/config.json`. Missing
//! files and missing fields fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_RETENTION_DAYS;
use crate::mount::MountPolicy;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tilecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the tile URL template
pub const TILE_URL_ENV: &str = "TILECACHE_TILE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub source: TileSourceConfig,
    pub cache: CacheConfig,
    pub mount: MountConfig,
    pub network: NetworkConfig,
    /// Overrides the platform cache directory when set.
    pub cache_dir: Option<PathBuf>,
}

/// Where tiles come from and how they are attributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSourceConfig {
    /// Template with `{z}`, `{x}`, `{y}` and optionally `{s}` placeholders.
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
    /// Substituted for `{s}`. Empty means the template has no subdomain.
    pub subdomains: Vec<String>,
}

impl Default for TileSourceConfig {
    fn default() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            max_zoom: 19,
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cached tiles older than this many days are treated as misses.
    pub retention_days: i64,
}

impl CacheConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.max(0))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// One retry per entry, waiting this many milliseconds first.
    pub retry_delays_ms: Vec<u64>,
    /// How long an unmounted widget lingers before it is torn down.
    pub teardown_grace_ms: u64,
}

impl MountConfig {
    pub fn policy(&self) -> MountPolicy {
        MountPolicy {
            retry_delays: self.retry_delays_ms.iter().copied().map(Duration::from_millis).collect(),
            teardown_grace: Duration::from_millis(self.teardown_grace_ms),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        let policy = MountPolicy::default();
        Self {
            retry_delays_ms: policy.retry_delays.iter().map(|d| d.as_millis() as u64).collect(),
            teardown_grace_ms: policy.teardown_grace.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    /// Requested once at startup to seed the online/offline signal.
    pub probe_url: String,
    pub user_agent: String,
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            probe_url: "https://tile.openstreetmap.org/".to_string(),
            user_agent: format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(TILE_URL_ENV) {
            if !url.trim().is_empty() {
                self.source.url_template = url;
            }
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("tiles"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.retention(), chrono::Duration::days(7));
        assert_eq!(config.source.subdomains.len(), 3);

        let policy = config.mount.policy();
        assert_eq!(policy.retry_delays, MountPolicy::default().retry_delays);
        assert_eq!(policy.teardown_grace, MountPolicy::default().teardown_grace);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cache": {"retention_days": 3}, "mount": {"retry_delays_ms": [0]}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cache.retention_days, 3);
        assert_eq!(config.mount.policy().retry_delays, vec![Duration::ZERO]);
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.cache_dir = Some(dir.path().join("tiles"));
        config.source.max_zoom = 12;

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.source.max_zoom, 12);
        assert_eq!(loaded.cache_dir().unwrap(), dir.path().join("tiles"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
