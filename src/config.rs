//! Configuration system using TOML files plus environment overrides.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\soundshelf\config.toml
//! - macOS: ~/Library/Application Support/soundshelf/config.toml
//! - Linux: ~/.config/soundshelf/config.toml
//!
//! Deployments usually configure the server through the environment
//! (`MUSIC_PATH`, `AUDIOBOOK_PATH`, `CACHE_DIR`, `WEBDAV_*`, `STRM_ADDRESS`);
//! those variables override whatever the file says.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local roots, cover cache and database
    pub library: LibraryConfig,

    /// Optional remote sources
    pub webdav: WebDavConfig,

    /// Live filesystem watching
    pub watcher: WatcherConfig,

    /// Partial HTTP fetches used to read remote tags
    pub probe: ProbeConfig,
}

/// Library roots and storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the local music tree
    pub music_path: PathBuf,

    /// Root of the local audiobook tree
    pub audiobook_path: PathBuf,

    /// Directory extracted covers are written to
    pub cache_path: PathBuf,

    /// SQLite database file
    pub database: PathBuf,

    /// Base URL for `.strm` files holding relative targets
    pub strm_address: Option<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_path: PathBuf::from("./music"),
            audiobook_path: PathBuf::from("./audiobooks"),
            cache_path: PathBuf::from("./music/cover"),
            database: PathBuf::from(crate::db::DEFAULT_DB_NAME),
            strm_address: None,
        }
    }
}

/// WebDAV sources (both optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDavConfig {
    pub music_url: Option<String>,
    pub audiobook_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl WebDavConfig {
    /// Whether any remote source is configured.
    pub fn is_configured(&self) -> bool {
        self.music_url.is_some() || self.audiobook_url.is_some()
    }
}

/// Watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Install the watcher after each successful import
    pub enabled: bool,

    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Quiet period before a change is reported, in milliseconds
    pub stability_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            stability_ms: 2000,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stability(&self) -> Duration {
        Duration::from_millis(self.stability_ms)
    }
}

/// Remote tag probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,

    /// Upper bound of the requested byte range
    pub range_bytes: u64,

    pub max_redirects: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            range_bytes: 1_048_576,
            max_redirects: 5,
        }
    }
}

impl Config {
    /// Apply environment variable overrides on top of file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    ///
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MUSIC_PATH") {
            self.library.music_path = PathBuf::from(v);
        }
        if let Some(v) = get("AUDIOBOOK_PATH") {
            self.library.audiobook_path = PathBuf::from(v);
        }
        if let Some(v) = get("CACHE_DIR") {
            self.library.cache_path = PathBuf::from(v);
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.library.database = PathBuf::from(v);
        }
        if let Some(v) = get("STRM_ADDRESS") {
            self.library.strm_address = Some(v);
        }
        if let Some(v) = get("WEBDAV_MUSIC_URL") {
            self.webdav.music_url = Some(v);
        }
        if let Some(v) = get("WEBDAV_AUDIOBOOK_URL") {
            self.webdav.audiobook_url = Some(v);
        }
        if let Some(v) = get("WEBDAV_USER") {
            self.webdav.user = Some(v);
        }
        if let Some(v) = get("WEBDAV_PASSWORD") {
            self.webdav.password = Some(v);
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("soundshelf"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk, then apply environment overrides.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let mut config = load_file();
    config.apply_env();
    config
}

fn load_file() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist. Returns the file path.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(path)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[library]"));
        assert!(toml.contains("[webdav]"));
        assert!(toml.contains("[watcher]"));
        assert!(toml.contains("[probe]"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[library]
music_path = "/srv/music"

[webdav]
music_url = "http://nas:5005/dav/music"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.library.music_path, PathBuf::from("/srv/music"));
        assert_eq!(config.library.audiobook_path, PathBuf::from("./audiobooks"));
        assert!(config.webdav.is_configured());
        assert_eq!(config.watcher.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.watcher.stability(), Duration::from_secs(2));
        assert_eq!(config.probe.range_bytes, 1_048_576);
        assert_eq!(config.probe.max_redirects, 5);
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut config = Config::default();
        config.library.music_path = PathBuf::from("/from/file");

        let env: HashMap<&str, &str> = HashMap::from([
            ("MUSIC_PATH", "/from/env"),
            ("WEBDAV_USER", "alice"),
            ("STRM_ADDRESS", "   "),
        ]);
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.library.music_path, PathBuf::from("/from/env"));
        assert_eq!(config.webdav.user.as_deref(), Some("alice"));
        assert!(config.library.strm_address.is_none());
        assert!(!config.webdav.is_configured());
    }
}
