// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Keyward.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Keyward configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeywardConfig {
    /// Master-key derivation settings.
    #[serde(default)]
    pub kdf: KdfConfig,

    /// Session lifetime and background task settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Credential cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Bulk encryption settings.
    #[serde(default)]
    pub bulk: BulkConfig,

    /// Persistence backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Provider connection-test settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Password KDF used to derive the master secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Argon2id,
    Pbkdf2,
}

/// Master-key derivation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KdfConfig {
    /// Which KDF to run (default: argon2id).
    #[serde(default = "default_kdf_algorithm")]
    pub algorithm: KdfAlgorithm,

    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub memory_cost: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_kdf_iterations")]
    pub iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_kdf_parallelism")]
    pub parallelism: u32,

    /// PBKDF2-HMAC-SHA256 rounds when `algorithm = "pbkdf2"`.
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            algorithm: default_kdf_algorithm(),
            memory_cost: default_kdf_memory_cost(),
            iterations: default_kdf_iterations(),
            parallelism: default_kdf_parallelism(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

fn default_kdf_algorithm() -> KdfAlgorithm {
    KdfAlgorithm::Argon2id
}

fn default_kdf_memory_cost() -> u32 {
    65536 // 64 MiB per OWASP recommendation
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

fn default_pbkdf2_iterations() -> u32 {
    310_000
}

/// Session lifetime and background task configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds of inactivity before the session expires (default: 1800).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Periodically rotate every cached purpose key.
    #[serde(default)]
    pub key_rotation_enabled: bool,

    /// Interval between scheduled rotations (default: 24h).
    #[serde(default = "default_key_rotation_interval_secs")]
    pub key_rotation_interval_secs: u64,

    /// Interval between key-cache cleanups. 0 disables the task.
    #[serde(default = "default_memory_cleanup_interval_secs")]
    pub memory_cleanup_interval_secs: u64,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn key_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.key_rotation_interval_secs)
    }

    pub fn memory_cleanup_interval(&self) -> Option<Duration> {
        (self.memory_cleanup_interval_secs > 0)
            .then(|| Duration::from_secs(self.memory_cleanup_interval_secs))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            key_rotation_enabled: false,
            key_rotation_interval_secs: default_key_rotation_interval_secs(),
            memory_cleanup_interval_secs: default_memory_cleanup_interval_secs(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_key_rotation_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_memory_cleanup_interval_secs() -> u64 {
    5 * 60
}

/// Credential cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of cached records (default: 100).
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Seconds a cached record stays valid (default: 1800).
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_capacity() -> usize {
    100
}

fn default_cache_ttl_secs() -> u64 {
    30 * 60
}

/// Bulk encryption configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BulkConfig {
    /// Items processed between cooperative yields (default: 10).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

/// Which persistence backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps. Nothing survives a restart.
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Persistence backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend selection (default: sqlite).
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("keyward").join("keyward.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("keyward.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Provider connection-test configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Hard deadline for a single liveness check (default: 10).
    #[serde(default = "default_connection_timeout_secs")]
    pub timeout_secs: u64,

    /// Per-provider endpoint overrides, keyed by provider name.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_connection_timeout_secs(),
            endpoints: BTreeMap::new(),
        }
    }
}

fn default_connection_timeout_secs() -> u64 {
    10
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
