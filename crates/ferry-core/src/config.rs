//! Configuration system for Ferry.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FERRY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/ferry/config.toml
//!   3. ~/.config/ferry/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chunk::{DEFAULT_CHUNK_SIZE, HEADER_LEN};
use crate::frame::MAX_FRAME_SIZE;
use crate::retry::DEFAULT_MAX_ATTEMPTS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the daemon listens on. Port 0 = OS-assigned.
    pub bind: String,
    /// Address ferry-ctl connects to.
    pub server: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding served files. Created on daemon start.
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per data chunk.
    pub chunk_size: usize,
    /// Concurrent chunk senders per transfer.
    pub workers: usize,
    /// Attempts per chunk, first send included.
    pub max_attempts: u8,
    /// How long a sender waits for ACK/NAK before counting a failed attempt.
    pub ack_timeout_ms: u64,
    /// Largest frame payload accepted from a peer.
    pub max_frame_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7070".into(),
            server: "127.0.0.1:7070".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("files"),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 4,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ack_timeout_ms: 10_000,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("ferry")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("ferry")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid transfer settings: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FerryConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            FerryConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FERRY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&FerryConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject settings no transfer could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.transfer;
        if t.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be non-zero".into()));
        }
        if t.workers == 0 {
            return Err(ConfigError::Invalid("workers must be non-zero".into()));
        }
        if t.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be non-zero".into()));
        }
        if t.chunk_size + HEADER_LEN > t.max_frame_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_size {} does not fit in max_frame_size {}",
                t.chunk_size, t.max_frame_size
            )));
        }
        Ok(())
    }

    /// Apply FERRY_* overrides. Unparseable numbers are ignored.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FERRY_NETWORK__BIND") {
            self.network.bind = v;
        }
        if let Some(v) = var("FERRY_NETWORK__SERVER") {
            self.network.server = v;
        }
        if let Some(v) = var("FERRY_STORAGE__ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Some(n) = var("FERRY_TRANSFER__CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.transfer.chunk_size = n;
        }
        if let Some(n) = var("FERRY_TRANSFER__WORKERS").and_then(|v| v.parse().ok()) {
            self.transfer.workers = n;
        }
        if let Some(n) = var("FERRY_TRANSFER__MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.transfer.max_attempts = n;
        }
        if let Some(n) = var("FERRY_TRANSFER__ACK_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.transfer.ack_timeout_ms = n;
        }
    }
}
