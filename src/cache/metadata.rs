//! Read-through cache of GGUF header metadata.
//!
//! Keyed on absolute path. Only successful extractions are stored; a missing
//! or unreadable file fails on every call. Concurrent misses on one path
//! share a single extraction. Entries are not invalidated when the file on
//! disk changes; call [`MetadataCache::invalidate`] or
//! [`MetadataCache::clear`] after replacing a model file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{MimirError, Result};
use crate::gguf::{self, GgufMetadata};
use crate::model::blocking;
use crate::telemetry;

/// Default maximum number of cached files.
pub const DEFAULT_METADATA_CACHE_MAX: u64 = 1_000;

/// Snapshot of the metadata cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataCacheStats {
    pub entry_count: usize,
    /// Cached absolute paths, sorted.
    pub cached_paths: Vec<PathBuf>,
}

/// Bounded, thread-safe store for extracted GGUF metadata.
pub struct MetadataCache {
    entries: moka::future::Cache<PathBuf, Arc<GgufMetadata>>,
}

impl MetadataCache {
    /// Create an empty cache with the default max capacity (1,000).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_METADATA_CACHE_MAX)
    }

    /// Create a cache with a custom max capacity.
    pub fn with_max_entries(max: u64) -> Self {
        Self {
            entries: moka::future::Cache::new(max),
        }
    }

    /// Get metadata for the GGUF file at `path`, extracting it on a miss.
    ///
    /// Extraction runs on the blocking pool. Errors are returned as-is and
    /// leave the path uncached.
    pub async fn get_metadata(&self, path: impl AsRef<Path>) -> Result<Arc<GgufMetadata>> {
        let path = absolute(path.as_ref())?;
        let source = path.clone();
        let entry = self
            .entries
            .entry(path)
            .or_try_insert_with(async move {
                let metadata = blocking(move || gguf::read_metadata(&source)).await?;
                Ok::<_, MimirError>(Arc::new(metadata))
            })
            .await
            .map_err(|e| (*e).clone())?;

        if entry.is_fresh() {
            metrics::counter!(telemetry::METADATA_CACHE_MISSES_TOTAL).increment(1);
            debug!(path = %entry.key().display(), "extracted GGUF metadata");
        } else {
            metrics::counter!(telemetry::METADATA_CACHE_HITS_TOTAL).increment(1);
        }
        Ok(entry.into_value())
    }

    /// Drop the cached entry for `path`, if any.
    pub async fn invalidate(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = absolute(path.as_ref())?;
        self.entries.invalidate(&path).await;
        Ok(())
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Current entry count and cached paths.
    pub async fn stats(&self) -> MetadataCacheStats {
        self.entries.run_pending_tasks().await;
        let mut cached_paths: Vec<PathBuf> = self
            .entries
            .iter()
            .map(|(path, _)| PathBuf::clone(&path))
            .collect();
        cached_paths.sort();
        MetadataCacheStats {
            entry_count: cached_paths.len(),
            cached_paths,
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        MimirError::InvalidInput(format!("cannot resolve path {}: {e}", path.display()))
    })
}
