//! Resolved per-data-source settings.

use std::path::PathBuf;

use tessera_config::path::normalize_container_path;
use tessera_config::{DataSourceConfig, MoverConfig};
use tessera_fragment::FragmentComputer;

use crate::{OutputError, Result};

/// Maximum threads for parallel moves (preserve system resources)
pub const MAX_MOVE_THREADS: usize = 4;

/// Default thread count for `threads = 0`: min(cpu_cores / 2, MAX_MOVE_THREADS)
pub fn default_thread_count() -> usize {
    (num_cpus::get() / 2).clamp(1, MAX_MOVE_THREADS)
}

/// Settings of one data source, validated and with defaults resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceProfile {
    pub id: String,
    /// Normalized logical container path
    pub context_path: String,
    /// Production area
    pub fs_path: PathBuf,
    /// Temporary area holding staging and attempt directories
    pub temp_path: PathBuf,
    pub output_staging: bool,
    pub min_fragment: i64,
    pub pref_fragment: i64,
    pub split_blocks: bool,
    pub combine_blocks: bool,
    /// Rename workers for bulk moves (1 = serial)
    pub move_threads: usize,
}

impl DataSourceProfile {
    pub fn from_config(ds: &DataSourceConfig, mover: &MoverConfig) -> Result<Self> {
        ds.validate()?;
        let temp_path = ds.resolved_temp_path();
        if temp_path == ds.fs_path {
            return Err(OutputError::InvalidArgument(format!(
                "temporary area must differ from the production area: {}.temp_path={}",
                ds.id,
                temp_path.display()
            )));
        }
        let move_threads = match mover.threads {
            None => 1,
            Some(0) => default_thread_count(),
            Some(n) => n,
        };
        Ok(Self {
            id: ds.id.clone(),
            context_path: normalize_container_path(&ds.path),
            fs_path: ds.fs_path.clone(),
            temp_path,
            output_staging: ds.output_staging,
            min_fragment: ds.fragment_min,
            pref_fragment: ds.fragment_pref,
            split_blocks: ds.block_split,
            combine_blocks: ds.block_combine,
            move_threads,
        })
    }

    pub fn fragment_computer(&self) -> FragmentComputer {
        FragmentComputer::new(
            self.min_fragment,
            self.pref_fragment,
            self.combine_blocks,
            self.split_blocks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DataSourceConfig {
        DataSourceConfig {
            id: "sales".into(),
            path: "/sales//daily/".into(),
            fs_path: PathBuf::from("/srv/sales"),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config_resolves_defaults() {
        let profile = DataSourceProfile::from_config(&config(), &MoverConfig::default()).unwrap();
        assert_eq!(profile.context_path, "sales/daily");
        assert_eq!(profile.temp_path, PathBuf::from("/srv/sales/_directio_temp"));
        assert_eq!(profile.move_threads, 1);
        assert!(profile.output_staging);
    }

    #[test]
    fn test_move_threads() {
        let explicit = MoverConfig { threads: Some(3) };
        let auto = MoverConfig { threads: Some(0) };
        assert_eq!(DataSourceProfile::from_config(&config(), &explicit).unwrap().move_threads, 3);
        let n = DataSourceProfile::from_config(&config(), &auto).unwrap().move_threads;
        assert!((1..=MAX_MOVE_THREADS).contains(&n));
    }

    #[test]
    fn test_temp_equal_to_production_rejected() {
        let mut ds = config();
        ds.temp_path = Some(ds.fs_path.clone());
        let err = DataSourceProfile::from_config(&ds, &MoverConfig::default()).unwrap_err();
        assert!(matches!(err, OutputError::InvalidArgument(_)));
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let mut ds = config();
        ds.fragment_min = 0;
        let err = DataSourceProfile::from_config(&ds, &MoverConfig::default()).unwrap_err();
        assert!(matches!(err, OutputError::Config(_)));
    }
}
