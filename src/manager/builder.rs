//! Builder for configuring cache manager instances

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::CacheManager;
use crate::cache::MetadataCache;
use crate::config::Config;
use crate::model::{
    AnomalyRequest, ClassifierRequest, EncoderRequest, LanguageRequest, LoadCoordinator, Loader,
    Loaders, TimeseriesRequest,
};
use crate::persistence::PersistenceManager;
use crate::{MimirError, Result};

/// Builder for configuring cache manager instances.
///
/// Explicit settings override the values in [`Config`].
#[derive(Debug, Default)]
pub struct CacheManagerBuilder {
    config: Config,
    default_ttl: Option<Duration>,
    models_dir: Option<PathBuf>,
    metadata_max_entries: Option<u64>,
    loaders: Loaders,
}

impl CacheManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Idle time after which cached models are unloaded.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Root directory for persisted models.
    pub fn models_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(path.into());
        self
    }

    /// Capacity of the GGUF metadata cache.
    pub fn metadata_max_entries(mut self, max: u64) -> Self {
        self.metadata_max_entries = Some(max);
        self
    }

    pub fn language_loader(mut self, loader: impl Loader<LanguageRequest> + 'static) -> Self {
        self.loaders.language = Some(Arc::new(loader));
        self
    }

    pub fn encoder_loader(mut self, loader: impl Loader<EncoderRequest> + 'static) -> Self {
        self.loaders.encoder = Some(Arc::new(loader));
        self
    }

    pub fn classifier_loader(mut self, loader: impl Loader<ClassifierRequest> + 'static) -> Self {
        self.loaders.classifier = Some(Arc::new(loader));
        self
    }

    pub fn anomaly_loader(mut self, loader: impl Loader<AnomalyRequest> + 'static) -> Self {
        self.loaders.anomaly = Some(Arc::new(loader));
        self
    }

    pub fn timeseries_loader(mut self, loader: impl Loader<TimeseriesRequest> + 'static) -> Self {
        self.loaders.timeseries = Some(Arc::new(loader));
        self
    }

    /// Build the manager.
    pub fn build(self) -> Result<CacheManager> {
        let mut config = self.config;
        if let Some(ttl) = self.default_ttl {
            if ttl.is_zero() {
                return Err(MimirError::Configuration(
                    "default TTL must be greater than zero".to_string(),
                ));
            }
            // The coordinator gets the exact TTL below; the config rounds up.
            config.cache.default_ttl_secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        }
        if let Some(max) = self.metadata_max_entries {
            config.metadata.max_entries = max;
        }
        if let Some(dir) = self.models_dir {
            config.persistence.models_dir = Some(dir);
        }
        config.validate()?;

        let ttl = self.default_ttl.unwrap_or_else(|| config.cache.default_ttl());
        let models_dir = config.persistence.resolved_models_dir();

        Ok(CacheManager {
            coordinator: LoadCoordinator::new(self.loaders, ttl),
            metadata: MetadataCache::with_max_entries(config.metadata.max_entries),
            persistence: PersistenceManager::new(models_dir),
            config,
        })
    }
}
