//! Configuration loading and database path resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the database file
pub const DATABASE_ENV_VAR: &str = "WPA_DATABASE";

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "WPA_CONFIG";

/// File name used when the database path falls back to the OS default
pub const DEFAULT_DATABASE_FILE: &str = "assessments.db";

/// Top-level TOML configuration
///
/// Every section is optional; missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// `[database]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; see [`resolve_database_path`] for precedence
    pub path: Option<PathBuf>,
    /// Open a second, read-only pool for reads that may be stale
    pub separate_reader: bool,
    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            separate_reader: false,
            busy_timeout_ms: 5000,
        }
    }
}

/// How the reconciliation driver lets storage catch up between write batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointMode {
    /// Run a passive WAL checkpoint on the primary pool
    #[default]
    Wal,
    /// Only yield to the async scheduler
    Yield,
}

/// `[sync]` section: reconciliation behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Link `Parent/Child` project titles to their parent on creation
    pub subprojects_enabled: bool,
    /// Assessments are declared on talk pages rather than subject pages
    pub assess_on_talk_pages: bool,
    /// Number of writes between replication checkpoints
    pub update_rows_per_query: usize,
    pub checkpoint: CheckpointMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            subprojects_enabled: false,
            assess_on_talk_pages: true,
            update_rows_per_query: 100,
            checkpoint: CheckpointMode::Wal,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse config text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.sync.update_rows_per_query == 0 {
            return Err(Error::Config(
                "sync.update_rows_per_query must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with graceful degradation
///
/// Resolution order for the file: explicit path, then `WPA_CONFIG`, then the
/// platform config directory. A missing file yields defaults with a warning;
/// a file that exists but does not parse is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var(CONFIG_ENV_VAR)
            .ok()
            .map(PathBuf::from)
            .or_else(default_config_path),
    };

    let Some(path) = path else {
        warn!("Could not determine config directory, using defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file not found: {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let config = TomlConfig::from_file(&path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Database path resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `WPA_DATABASE`
/// 3. TOML `database.path`
/// 4. OS-dependent default (fallback)
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.database.path {
        return path.clone();
    }

    default_database_path()
}

/// Default config file: `<config_dir>/wpa/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wpa").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wpa"))
        .unwrap_or_else(|| PathBuf::from("./wpa_data"))
        .join(DEFAULT_DATABASE_FILE)
}
