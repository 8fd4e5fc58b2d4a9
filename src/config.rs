//! Application configuration.
//!
//! Loaded from `<data_dir>/config.toml` (TOML, every field optional). A
//! missing file means defaults; a malformed file is a startup error, never
//! a silent fallback.

use crate::auth::DEFAULT_SESSION_TTL_SECS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub archive: ArchiveConfig,

    /// Where the database, uploads, and config file live.
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path this config was loaded from (or would be saved to).
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Whether new accounts may be created.
    pub allow_registration: bool,
    /// Maximum registered users (0 = unlimited).
    pub max_users: u64,
    /// Sliding-window limit on login/register attempts per client.
    pub credential_attempts_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Upload size ceiling in bytes; also caps every request body.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            archive: ArchiveConfig::default(),
            config_path: data_dir.join("config.toml"),
            data_dir,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            allow_registration: true,
            max_users: 0,
            credential_attempts_per_minute: 10,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// `~/.studydesk`, or `./.studydesk` when no home directory resolves.
pub fn default_data_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".studydesk"))
        .unwrap_or_else(|| PathBuf::from(".studydesk"))
}

impl Config {
    /// Load configuration rooted at `data_dir`. `config_path` overrides the
    /// default `<data_dir>/config.toml` location.
    pub fn load(data_dir: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        let path = config_path.unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        } else {
            Self::default()
        };

        config.data_dir = data_dir;
        config.config_path = path;
        Ok(config)
    }

    /// Write the current configuration back to its file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        fs::write(&self.config_path, raw)
            .with_context(|| format!("failed to write config {}", self.config_path.display()))?;
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("studydesk.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}
