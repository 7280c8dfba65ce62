//! Caching subsystem.
//!
//! Two independent caches:
//!
//! - [`TtlCache`]: live model instances with sliding expiration. Removal
//!   always unloads the instance first. Driven by the
//!   [`LoadCoordinator`](crate::model::LoadCoordinator).
//!
//! - [`MetadataCache`]: bounded read-through store (moka) of GGUF header
//!   metadata keyed on absolute file path.

pub mod metadata;
pub mod ttl;

pub use metadata::{MetadataCache, MetadataCacheStats, DEFAULT_METADATA_CACHE_MAX};
pub use ttl::{EvictionReason, TtlCache, Unload};
