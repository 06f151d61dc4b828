//! Configuration loading for the relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for the relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Lobby and rate limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Lobby record storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Cleanup task configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// Credential verification.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP/WebSocket bind address (default: 0.0.0.0:8787).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Lobby and rate limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Roster capacity per lobby (default: 6).
    #[serde(default = "default_max_members")]
    pub max_members: usize,
    /// Attach attempts per peer id per minute (default: 20).
    #[serde(default = "default_attaches_per_minute")]
    pub attaches_per_minute: u32,
    /// Control messages per peer per minute (default: 600).
    ///
    /// Candidate trickling is bursty, so this is generous.
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// Requests per second across all peers (default: 1000).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
    /// Seconds without any frame before a control channel is dropped (default: 120).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Largest accepted control frame in bytes (default: 64KB).
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Display names are cut to this many characters (default: 32).
    #[serde(default = "default_max_display_name_len")]
    pub max_display_name_len: usize,
}

/// Lobby record storage.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Seconds an empty lobby is kept before cleanup (default: 24h).
    #[serde(default = "default_suspended_ttl")]
    pub suspended_ttl_secs: u64,
}

/// Cleanup task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Cleanup interval in seconds (default: 600).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Enable cleanup task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

/// Credential verification.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of guest identities issued by the open verifier (default: 24h).
    #[serde(default = "default_guest_ttl")]
    pub guest_ttl_secs: u64,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_max_members() -> usize {
    sync_core::DEFAULT_CAPACITY
}

fn default_attaches_per_minute() -> u32 {
    20
}

fn default_messages_per_minute() -> u32 {
    600
}

fn default_global_requests_per_second() -> u32 {
    1000
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_max_message_bytes() -> usize {
    64 * 1024
}

fn default_max_display_name_len() -> usize {
    32
}

fn default_database_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_suspended_ttl() -> u64 {
    24 * 60 * 60
}

fn default_cleanup_interval() -> u64 {
    600
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_guest_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_members: default_max_members(),
            attaches_per_minute: default_attaches_per_minute(),
            messages_per_minute: default_messages_per_minute(),
            global_requests_per_second: default_global_requests_per_second(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_message_bytes: default_max_message_bytes(),
            max_display_name_len: default_max_display_name_len(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            suspended_ttl_secs: default_suspended_ttl(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            guest_ttl_secs: default_guest_ttl(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
