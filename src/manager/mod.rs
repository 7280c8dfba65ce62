//! Process-wide owner of the model caches.
//!
//! A [`CacheManager`] is built once at startup with [`CacheManagerBuilder`]
//! and shared as `Arc<CacheManager>` with whatever handles requests.

mod builder;

pub use builder::CacheManagerBuilder;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::MetadataCache;
use crate::config::Config;
use crate::error::{MimirError, Result};
use crate::model::LoadCoordinator;
use crate::persistence::PersistenceManager;

/// Owns the load coordinator, the GGUF metadata cache and the persistence
/// manager.
pub struct CacheManager {
    coordinator: LoadCoordinator,
    metadata: MetadataCache,
    persistence: PersistenceManager,
    config: Config,
}

impl CacheManager {
    /// Create a new builder for configuring the manager.
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::new()
    }

    pub fn coordinator(&self) -> &LoadCoordinator {
        &self.coordinator
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Unload every cached model and drop all cached metadata.
    pub fn clear(&self) -> usize {
        self.metadata.clear();
        self.coordinator.clear()
    }

    /// Spawn a task that sweeps expired models every `interval`.
    ///
    /// The task holds only a weak reference and exits once the manager is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Result<JoinHandle<()>> {
        if interval.is_zero() {
            return Err(MimirError::InvalidInput(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        let manager: Weak<Self> = Arc::downgrade(self);
        info!(interval_secs = interval.as_secs_f64(), "starting cache sweeper");
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    debug!("cache manager dropped, stopping sweeper");
                    break;
                };
                let swept = manager.coordinator.sweep();
                if swept > 0 {
                    debug!(swept, "swept expired models");
                }
            }
        }))
    }

    /// Spawn the sweeper with the configured interval, unless disabled.
    pub fn spawn_configured_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.config
            .cache
            .sweep_interval()
            .and_then(|interval| self.spawn_sweeper(interval).ok())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("loaded_models", &self.coordinator.loaded_models().total())
            .field("models_dir", &self.persistence.models_dir())
            .field("config", &self.config)
            .finish()
    }
}
