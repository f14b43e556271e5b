//! Data sources mounted at logical container paths.
//!
//! The repository maps container paths to providers and hands out one shared
//! [`StagedOutput`] per provider, created on first use.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tessera_config::path::{container_contains, normalize_container_path};
use tessera_config::Config;
use tessera_store::FileStore;

use crate::profile::DataSourceProfile;
use crate::staged::StagedOutput;
use crate::{OutputError, Result};

/// Creates the data source instance mounted at one container path.
pub trait DataSourceProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Normalized container path
    fn path(&self) -> &str;

    fn new_instance(&self) -> Result<StagedOutput>;
}

/// Provider backed by a resolved profile and a shared store
#[derive(Debug, Clone)]
pub struct ProfileProvider {
    profile: DataSourceProfile,
    store: Arc<dyn FileStore>,
}

impl ProfileProvider {
    pub fn new(profile: DataSourceProfile, store: Arc<dyn FileStore>) -> Self {
        Self { profile, store }
    }
}

impl DataSourceProvider for ProfileProvider {
    fn id(&self) -> &str {
        &self.profile.id
    }

    fn path(&self) -> &str {
        &self.profile.context_path
    }

    fn new_instance(&self) -> Result<StagedOutput> {
        Ok(StagedOutput::new(
            self.profile.clone(),
            Arc::clone(&self.store),
        ))
    }
}

pub struct DataSourceRepository {
    providers: BTreeMap<String, Box<dyn DataSourceProvider>>,
    instances: DashMap<String, Arc<StagedOutput>>,
}

impl DataSourceRepository {
    /// Fails if two providers share a normalized container path.
    pub fn new(providers: Vec<Box<dyn DataSourceProvider>>) -> Result<Self> {
        let mut map: BTreeMap<String, Box<dyn DataSourceProvider>> = BTreeMap::new();
        for provider in providers {
            let path = normalize_container_path(provider.path());
            if let Some(existing) = map.get(&path) {
                return Err(OutputError::InvalidArgument(format!(
                    "path mapping is duplicated: {} ({} <=> {})",
                    if path.is_empty() { "/" } else { &path },
                    existing.id(),
                    provider.id()
                )));
            }
            map.insert(path, provider);
        }
        Ok(Self {
            providers: map,
            instances: DashMap::new(),
        })
    }

    /// One [`ProfileProvider`] per configured data source, all sharing `store`
    pub fn from_config(config: &Config, store: Arc<dyn FileStore>) -> Result<Self> {
        config.validate()?;
        let providers = config
            .datasources
            .iter()
            .map(|ds| {
                let profile = DataSourceProfile::from_config(ds, &config.mover)?;
                Ok(Box::new(ProfileProvider::new(profile, Arc::clone(&store)))
                    as Box<dyn DataSourceProvider>)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(providers)
    }

    /// Every container path, sorted
    pub fn container_paths(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Longest container path that is a segment-wise prefix of `path`
    pub fn find_container_path(&self, path: &str) -> Option<String> {
        let path = normalize_container_path(path);
        self.providers
            .keys()
            .filter(|container| container_contains(container, &path))
            .max_by_key(|container| container.len())
            .cloned()
    }

    pub fn related_id(&self, path: &str) -> Result<String> {
        Ok(self.provider(path)?.id().to_string())
    }

    /// The instance serving `path`, created on first request
    pub fn related_data_source(&self, path: &str) -> Result<Arc<StagedOutput>> {
        let container = self.container_of(path)?;
        if let Some(instance) = self.instances.get(&container) {
            return Ok(Arc::clone(instance.value()));
        }
        let instance = self
            .instances
            .entry(container.clone())
            .or_try_insert_with(|| {
                let provider = self
                    .providers
                    .get(&container)
                    .ok_or_else(|| OutputError::UnknownContainer {
                        path: container.clone(),
                    })?;
                provider.new_instance().map(Arc::new)
            })?;
        Ok(Arc::clone(instance.value()))
    }

    fn container_of(&self, path: &str) -> Result<String> {
        self.find_container_path(path)
            .ok_or_else(|| OutputError::UnknownContainer {
                path: path.to_string(),
            })
    }

    fn provider(&self, path: &str) -> Result<&dyn DataSourceProvider> {
        let container = self.container_of(path)?;
        self.providers
            .get(&container)
            .map(|p| p.as_ref())
            .ok_or(OutputError::UnknownContainer { path: container })
    }
}

impl fmt::Debug for DataSourceRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceRepository")
            .field("containers", &self.container_paths())
            .field("instances", &self.instances.len())
            .finish()
    }
}
