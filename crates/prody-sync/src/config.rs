//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PRODY_SYNC_ENABLED=false                                           │
//! │     PRODY_SYNC_MAX_ATTEMPTS=5                                          │
//! │     PRODY_SYNC_DB_PATH=/data/prody-sync.db                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/prashant/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.prody.prashant/sync.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     enabled, 3 attempts, 2s base / 300s max backoff, SQLite storage    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [engine]
//! enabled = true
//! max_attempts = 3
//! execution_timeout_secs = 30
//! stuck_threshold_secs = 300
//!
//! [retry]
//! base_delay_ms = 2000
//! max_delay_secs = 300
//!
//! [storage]
//! backend = "sqlite"   # sqlite | file | memory
//! path = "/data/prody-sync.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use prody_core::DEFAULT_MAX_ATTEMPTS;

use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Engine Settings
// =============================================================================

/// Engine behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Whether draining is enabled at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Failed attempts tolerated before an operation is marked FAILED.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound on a single executor call (seconds).
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Age after which an in-flight operation counts as stuck (seconds).
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_execution_timeout() -> u64 {
    30
}

fn default_stuck_threshold() -> u64 {
    300
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            enabled: true,
            max_attempts: default_max_attempts(),
            execution_timeout_secs: default_execution_timeout(),
            stuck_threshold_secs: default_stuck_threshold(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Cap on the pre-jitter delay (seconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

fn default_base_delay() -> u64 {
    2_000
}

fn default_max_delay() -> u64 {
    300
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            base_delay_ms: default_base_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the pending queue is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Row in the SQLite `sync_store` table.
    #[default]
    Sqlite,
    /// Standalone JSON file.
    File,
    /// Process memory only. Nothing survives a restart.
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::File => write!(f, "file"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "db" => Ok(StorageBackend::Sqlite),
            "file" | "json" => Ok(StorageBackend::File),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown storage backend: '{}'. Valid options: sqlite, file, memory",
                other
            ))),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database or JSON file path. Defaults to the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        // A zero base delay would let nextRetryAt equal the failed attempt
        if self.retry.base_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "retry.base_delay_ms must be greater than 0".into(),
            ));
        }

        if self.retry.max_delay_secs.saturating_mul(1_000) < self.retry.base_delay_ms {
            return Err(SyncError::InvalidConfig(format!(
                "retry.max_delay_secs ({}s) is below retry.base_delay_ms ({}ms)",
                self.retry.max_delay_secs, self.retry.base_delay_ms
            )));
        }

        if self.engine.execution_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "engine.execution_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.engine.stuck_threshold_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "engine.stuck_threshold_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PRODY_SYNC_ENABLED") {
            match parse_bool(&value) {
                Some(enabled) => {
                    debug!(enabled, "Overriding sync enabled from environment");
                    self.engine.enabled = enabled;
                }
                None => warn!(value = %value, "Ignoring invalid PRODY_SYNC_ENABLED"),
            }
        }

        override_number(&lookup, "PRODY_SYNC_MAX_ATTEMPTS", &mut self.engine.max_attempts);
        override_number(&lookup, "PRODY_SYNC_BASE_DELAY_MS", &mut self.retry.base_delay_ms);
        override_number(&lookup, "PRODY_SYNC_MAX_DELAY_SECS", &mut self.retry.max_delay_secs);
        override_number(
            &lookup,
            "PRODY_SYNC_EXECUTION_TIMEOUT_SECS",
            &mut self.engine.execution_timeout_secs,
        );

        if let Some(path) = lookup("PRODY_SYNC_DB_PATH") {
            debug!(path = %path, "Overriding storage path from environment");
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Backoff policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            max_attempts: self.engine.max_attempts,
        }
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.execution_timeout_secs)
    }

    pub fn stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.engine.stuck_threshold_secs).unwrap_or(i64::MAX))
    }

    /// Returns true if sync is enabled.
    pub fn is_sync_enabled(&self) -> bool {
        self.engine.enabled
    }

    /// Storage path, falling back to the platform data dir.
    ///
    /// `None` only for the memory backend or when no home dir exists.
    pub fn storage_path(&self) -> Option<PathBuf> {
        if self.storage.backend == StorageBackend::Memory {
            return None;
        }
        self.storage.path.clone().or_else(|| {
            let file_name = match self.storage.backend {
                StorageBackend::File => "pending_sync_operations.json",
                _ => "prody-sync.db",
            };
            project_dirs().map(|dirs| dirs.data_dir().join(file_name))
        })
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "prody", "prashant")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn override_number<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    if let Some(value) = lookup(key) {
        match value.trim().parse::<T>() {
            Ok(parsed) => {
                debug!(key, value = %parsed, "Overriding from environment");
                *target = parsed;
            }
            Err(_) => warn!(key, value = %value, "Ignoring invalid numeric override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.is_sync_enabled());
        assert_eq!(config.engine.max_attempts, 3);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.validate().is_ok());

        let policy = config.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(300));
        assert_eq!(config.stuck_threshold(), chrono::Duration::seconds(300));
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.retry.base_delay_ms = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_secs = 5;
        assert!(config.validate().is_err());

        config.retry.max_delay_secs = 10;
        assert!(config.validate().is_ok());

        config.engine.execution_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SyncConfig::default();
        config.apply_overrides(lookup(&[
            ("PRODY_SYNC_ENABLED", "false"),
            ("PRODY_SYNC_MAX_ATTEMPTS", "5"),
            ("PRODY_SYNC_BASE_DELAY_MS", "500"),
            ("PRODY_SYNC_DB_PATH", "/tmp/queue.db"),
        ]));

        assert!(!config.engine.enabled);
        assert_eq!(config.engine.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.storage_path(), Some(PathBuf::from("/tmp/queue.db")));
    }

    #[test]
    fn test_invalid_env_overrides_are_ignored() {
        let mut config = SyncConfig::default();
        config.apply_overrides(lookup(&[
            ("PRODY_SYNC_ENABLED", "maybe"),
            ("PRODY_SYNC_MAX_ATTEMPTS", "-1"),
        ]));

        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("sqlite".parse::<StorageBackend>().unwrap(), StorageBackend::Sqlite);
        assert_eq!("FILE".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_memory_backend_has_no_path() {
        let mut config = SyncConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.path = Some(PathBuf::from("/ignored"));
        assert_eq!(config.storage_path(), None);
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");

        let mut config = SyncConfig::default();
        config.engine.max_attempts = 7;
        config.storage.backend = StorageBackend::File;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[engine]"));
        assert!(contents.contains("backend = \"file\""));

        let parsed: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: SyncConfig = toml::from_str("[retry]\nbase_delay_ms = 250\n").unwrap();
        assert_eq!(parsed.retry.base_delay_ms, 250);
        assert_eq!(parsed.retry.max_delay_secs, 300);
        assert!(parsed.engine.enabled);
    }
}
