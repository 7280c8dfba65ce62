//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `kind`: model kind (e.g. "language", "encoder", "classifier")
//! - `status`: outcome: "ok" or "error"
//! - `reason`: eviction cause: "mismatch", "expired", "manual", "replaced"

/// Model cache hits (fingerprint matched).
///
/// Labels: `kind`.
pub const MODEL_CACHE_HITS_TOTAL: &str = "mimir_model_cache_hits_total";

/// Model cache misses (absent, expired, or fingerprint mismatch).
///
/// Labels: `kind`.
pub const MODEL_CACHE_MISSES_TOTAL: &str = "mimir_model_cache_misses_total";

/// Loader invocations.
///
/// Labels: `kind`, `status` ("ok" | "error").
pub const MODEL_BUILDS_TOTAL: &str = "mimir_model_builds_total";

/// Loader duration in seconds.
///
/// Labels: `kind`.
pub const MODEL_BUILD_DURATION_SECONDS: &str = "mimir_model_build_duration_seconds";

/// Entries removed from the model cache (each one unloaded).
///
/// Labels: `reason`.
pub const MODEL_EVICTIONS_TOTAL: &str = "mimir_model_evictions_total";

/// GGUF metadata cache hits.
pub const METADATA_CACHE_HITS_TOTAL: &str = "mimir_metadata_cache_hits_total";

/// GGUF metadata cache misses (each one triggers an extraction attempt).
pub const METADATA_CACHE_MISSES_TOTAL: &str = "mimir_metadata_cache_misses_total";

/// Failed post-fit saves.
pub const PERSISTENCE_FAILURES_TOTAL: &str = "mimir_persistence_failures_total";
