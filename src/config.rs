//! Configuration file parser for ~/.config/gbfs-sync/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings, since they are usually
//! typos.
use crate::cache::{LruFeedCache, ZeroCapacity};
use crate::client::{ClientOptions, DEFAULT_TIMEOUT};
use crate::server::{ServerOptions, DEFAULT_TTL};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid cache_capacity: {0}")]
    CacheCapacity(#[from] ZeroCapacity),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration. Both sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

/// `[client]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL of the discovery feed to follow.
    pub auto_discovery_url: String,
    pub default_language: Option<String>,
    pub user_agent: Option<String>,
    /// HTTP request deadline in seconds.
    pub timeout_secs: u64,
    /// Bound the feed cache to this many entries (unbounded when unset).
    pub cache_capacity: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_discovery_url: String::new(),
            default_language: None,
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            cache_capacity: None,
        }
    }
}

impl ClientConfig {
    const KEYS: [&'static str; 5] = [
        "auto_discovery_url",
        "default_language",
        "user_agent",
        "timeout_secs",
        "cache_capacity",
    ];

    /// Client options described by this section. URL validation is left to
    /// [`Client::new`](crate::client::Client::new).
    pub fn to_options(&self) -> Result<ClientOptions, ConfigError> {
        let mut options = ClientOptions::new(self.auto_discovery_url.clone());
        options.default_language = self.default_language.clone();
        options.user_agent = self.user_agent.clone();
        options.timeout = Duration::from_secs(self.timeout_secs);
        if let Some(capacity) = self.cache_capacity {
            options.cache = Some(Arc::new(LruFeedCache::new(capacity)?));
        }
        Ok(options)
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub system_id: String,
    /// Directory the feed tree is written into.
    pub root_dir: PathBuf,
    pub base_url: String,
    pub base_path: String,
    pub version: Option<String>,
    pub default_ttl: u64,
    /// Directory of static `[lang/]name.json` payloads for `publish`.
    pub source_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            system_id: String::new(),
            root_dir: PathBuf::new(),
            base_url: String::new(),
            base_path: String::new(),
            version: None,
            default_ttl: DEFAULT_TTL,
            source_dir: None,
        }
    }
}

impl ServerConfig {
    const KEYS: [&'static str; 7] = [
        "system_id",
        "root_dir",
        "base_url",
        "base_path",
        "version",
        "default_ttl",
        "source_dir",
    ];

    /// Publisher options without handlers. Field validation is left to
    /// [`Server::new`](crate::server::Server::new).
    pub fn to_options(&self) -> ServerOptions {
        let mut options = ServerOptions::new(
            self.system_id.clone(),
            self.root_dir.clone(),
            self.base_url.clone(),
        )
        .with_base_path(self.base_path.clone())
        .with_default_ttl(self.default_ttl);
        options.version = self.version.clone();
        options
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `~/.config/gbfs-sync/config.toml`, if `HOME` is set.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("gbfs-sync")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        let known: &[&str] = match key.as_str() {
            "client" => &ClientConfig::KEYS,
            "server" => &ServerConfig::KEYS,
            _ => {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                continue;
            }
        };
        if let Some(section) = value.as_table() {
            for nested in section.keys() {
                if !known.contains(&nested.as_str()) {
                    tracing::warn!(key = %format!("{key}.{nested}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
