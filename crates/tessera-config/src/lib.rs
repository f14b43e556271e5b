//! # tessera-config
//!
//! Configuration management for Tessera.
//!
//! Loads configuration from:
//! 1. `~/.tessera/config.toml` (global)
//! 2. `.tessera/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Nothing here is cached globally: callers load a [`Config`] once and pass
//! it (or values derived from it) down explicitly.

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default name of the system directory holding transaction markers.
pub const DEFAULT_SYSTEM_DIR: &str = "_directio";

/// Default temporary area name, relative to a data source's `fs_path`.
pub const DEFAULT_TEMP_SUFFIX: &str = "_directio_temp";

/// Default minimum fragment size (16 MiB).
pub const DEFAULT_MIN_FRAGMENT: i64 = 16 * 1024 * 1024;

/// Default preferred fragment size (64 MiB).
pub const DEFAULT_PREF_FRAGMENT: i64 = 64 * 1024 * 1024;

/// Coarse classification shared by every Tessera error type.
///
/// Nothing retries internally; callers pick a policy from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected input or configuration; retrying will not help
    Validation,
    /// Storage failure; usually worth retrying
    Io,
    /// The caller's cancellation token fired
    Cancelled,
    /// Some data source instances failed; the operation is re-runnable
    PartialFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io(_) => ErrorKind::Io,
            ConfigError::Toml(_) | ConfigError::Invalid(_) => ErrorKind::Validation,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system: SystemConfig,
    pub mover: MoverConfig,
    #[serde(rename = "datasource")]
    pub datasources: Vec<DataSourceConfig>,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::global_config_path(), Path::new(".tessera/config.toml"))
    }

    /// Load config from an explicit global file and project file.
    ///
    /// Missing files are skipped. The result is validated.
    pub fn load_from(global: Option<PathBuf>, project: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(&global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        if project.exists() {
            debug!("Loading project config from {:?}", project);
            let contents = std::fs::read_to_string(project)?;
            let project_config: Config = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Global config path: ~/.tessera/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".tessera/config.toml"))
    }

    /// Merge another config (project overrides)
    fn merge(&mut self, other: Config) {
        if other.system.dir != SystemConfig::default().dir {
            self.system.dir = other.system.dir;
        }
        if other.mover.threads.is_some() {
            self.mover.threads = other.mover.threads;
        }
        // data sources are replaced wholesale, never mixed
        if !other.datasources.is_empty() {
            self.datasources = other.datasources;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TESSERA_SYSTEM_DIR") {
            self.system.dir = PathBuf::from(dir);
        }
        if let Ok(threads) = std::env::var("TESSERA_MOVE_THREADS") {
            if let Ok(n) = threads.parse() {
                self.mover.threads = Some(n);
            }
        }
    }

    /// Check every data source and the cross-source constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids: HashMap<&str, ()> = HashMap::new();
        let mut paths: HashMap<String, &str> = HashMap::new();
        for ds in &self.datasources {
            ds.validate()?;
            if ids.insert(ds.id.as_str(), ()).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "data source id is duplicated: {}",
                    ds.id
                )));
            }
            let normalized = path::normalize_container_path(&ds.path);
            if let Some(other) = paths.insert(normalized.clone(), ds.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "path mapping is duplicated: {} ({} <=> {})",
                    if normalized.is_empty() { "/" } else { &normalized },
                    other,
                    ds.id
                )));
            }
        }
        Ok(())
    }

    /// Absolute directory holding commit markers.
    pub fn transactions_dir(&self) -> PathBuf {
        self.system.dir.join("transactions")
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// System area configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Root of the system area (commit markers live under `transactions/`)
    pub dir: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SYSTEM_DIR),
        }
    }
}

/// Bulk move configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverConfig {
    /// Number of parallel rename workers (None = serial, 0 = derive from CPU count)
    pub threads: Option<usize>,
}

/// One named data source mounted at a logical container path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Data source id (appears in temporary area names)
    pub id: String,
    /// Logical container path, e.g. `"sales/daily"`; empty means root
    pub path: String,
    /// Production directory backing this data source
    pub fs_path: PathBuf,
    /// Temporary area (defaults to `<fs_path>/_directio_temp`)
    pub temp_path: Option<PathBuf>,
    /// Promote attempts through a staging area
    pub output_staging: bool,
    /// Minimum fragment size; negative disables splitting, zero is rejected
    pub fragment_min: i64,
    /// Preferred fragment size; must be positive
    pub fragment_pref: i64,
    /// Allow splitting a file into several fragments
    pub block_split: bool,
    /// Merge adjacent blocks owned by the same hosts
    pub block_combine: bool,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            path: String::new(),
            fs_path: PathBuf::new(),
            temp_path: None,
            output_staging: true,
            fragment_min: DEFAULT_MIN_FRAGMENT,
            fragment_pref: DEFAULT_PREF_FRAGMENT,
            block_split: true,
            block_combine: true,
        }
    }
}

impl DataSourceConfig {
    /// Temporary area, falling back to `<fs_path>/_directio_temp`.
    pub fn resolved_temp_path(&self) -> PathBuf {
        self.temp_path
            .clone()
            .unwrap_or_else(|| self.fs_path.join(DEFAULT_TEMP_SUFFIX))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::Invalid(
                "data source id must not be empty".to_string(),
            ));
        }
        if self.fs_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "missing fs_path: {}.fs_path",
                self.id
            )));
        }
        if self.fragment_min == 0 {
            return Err(ConfigError::Invalid(format!(
                "minimum fragment size must not be zero: {}.fragment_min",
                self.id
            )));
        }
        if self.fragment_pref <= 0 {
            return Err(ConfigError::Invalid(format!(
                "preferred fragment size must be > 0: {}.fragment_pref={}",
                self.id, self.fragment_pref
            )));
        }
        Ok(())
    }
}
