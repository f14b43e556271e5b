//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary root that disappears with the environment
//! - Production and temporary areas for any number of data sources
//! - An isolated system area for commit markers
//!
//! # Usage
//!
//! ```ignore
//! use tessera_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let config = env.config(&["alpha", "beta"]);
//!     // config.datasources[0].fs_path == env.production("alpha")
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, DataSourceConfig, MoverConfig, SystemConfig};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of all data source directories
    pub data_root: PathBuf,
    /// Isolated system area
    pub system_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let data_root = root.join("data");
        let system_dir = root.join("system");

        std::fs::create_dir_all(&data_root)?;
        std::fs::create_dir_all(&system_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            data_root,
            system_dir,
            test_id,
        })
    }

    /// Production directory of a data source
    pub fn production(&self, id: &str) -> PathBuf {
        self.data_root.join(id)
    }

    /// Temporary area of a data source (kept outside its production tree)
    pub fn temporary(&self, id: &str) -> PathBuf {
        self.data_root.join(format!("{}.tmp", id))
    }

    /// Directory holding commit markers
    pub fn transactions_dir(&self) -> PathBuf {
        self.system_dir.join("transactions")
    }

    /// Data source config mounted at container path `id`.
    ///
    /// Fragmenting is off by default so tests get one fragment per file.
    pub fn datasource(&self, id: &str) -> DataSourceConfig {
        DataSourceConfig {
            id: id.to_string(),
            path: id.to_string(),
            fs_path: self.production(id),
            temp_path: Some(self.temporary(id)),
            fragment_min: -1,
            ..Default::default()
        }
    }

    /// Full config with one data source per id
    pub fn config(&self, ids: &[&str]) -> Config {
        Config {
            system: SystemConfig {
                dir: self.system_dir.clone(),
            },
            mover: MoverConfig::default(),
            datasources: ids.iter().map(|id| self.datasource(id)).collect(),
        }
    }

    /// Create a file with content below `base`, creating parents
    pub fn create_file(&self, base: &Path, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = base.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Count regular files below `dir` (0 if it does not exist)
    pub fn count_files(&self, dir: &Path) -> usize {
        fn walk(dir: &Path) -> usize {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return 0;
            };
            entries
                .filter_map(|e| e.ok())
                .map(|e| {
                    let path = e.path();
                    if path.is_dir() {
                        walk(&path)
                    } else {
                        1
                    }
                })
                .sum()
        }
        walk(dir)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
