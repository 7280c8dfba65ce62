//! Mimir - model lifecycle and cache subsystem for local inference runtimes
//!
//! This crate decides whether a requested model configuration already has a
//! live instance, coordinates exactly one concurrent build per cache key when
//! it does not, unloads instances that sit idle past their TTL or whose
//! configuration has drifted, and memoizes GGUF header metadata.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mimir::{loader_fn, CacheManager, LanguageModel, LanguageRequest, MimirError};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let manager = Arc::new(
//!         CacheManager::builder()
//!             .language_loader(loader_fn(|request: LanguageRequest| async move {
//!                 let model: Arc<dyn LanguageModel> = Arc::new(MyLlama::open(&request)?);
//!                 Ok::<_, MimirError>(model)
//!             }))
//!             .build()?,
//!     );
//!     manager.spawn_configured_sweeper();
//!
//!     let request = LanguageRequest::new("unsloth/Qwen3-1.7B-GGUF", 8192).quantization("Q4_K_M");
//!     let model = manager.coordinator().get_or_load_language(&request).await?;
//!     println!("{}", model.generate("Hello", 32).await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gguf;
pub mod key;
pub mod manager;
pub mod model;
pub mod persistence;
pub mod telemetry;
pub mod version;

// Re-export main types at crate root
pub use cache::{EvictionReason, MetadataCache, MetadataCacheStats, TtlCache, Unload};
pub use config::Config;
pub use error::{MimirError, Result};
pub use gguf::GgufMetadata;
pub use key::CacheKey;
pub use manager::{CacheManager, CacheManagerBuilder};
pub use persistence::{Persist, PersistenceManager, SaveManifest};

pub use model::{
    blocking, loader_fn, AnomalyModel, AnomalyRequest, Classification, ClassifierModel,
    ClassifierRequest, Device, EncoderModel, EncoderRequest, EncoderTask, Fingerprint,
    LanguageModel, LanguageRequest, LoadCoordinator, LoadedModels, Loader, Loaders, Model,
    ModelFormat, ModelHandle, ModelKind, ModelRequest, TimeseriesModel, TimeseriesRequest,
};
