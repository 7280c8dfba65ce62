//! Load coordination for cached model instances.
//!
//! Double-checked acquire, per key:
//!
//! 1. Fast path: read the cache. A live entry whose fingerprint equals the
//!    request's is returned (and its TTL re-armed by the read).
//! 2. Otherwise join the key's in-flight build, or start one. Builds run on
//!    their own task and are shared by every caller waiting on that key.
//! 3. The build re-checks the cache (an earlier build may have finished in
//!    between), evicts a stale entry whose fingerprint differs, runs the
//!    loader, and inserts the result.
//!
//! Builds for unrelated keys run concurrently. A caller that stops waiting
//! (timeout, dropped request) does not cancel the build; its result is
//! still cached for the next caller. Failed builds are never cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::handle::{
    AnomalyModel, ClassifierModel, EncoderModel, LanguageModel, ModelHandle, ModelKind,
    TimeseriesModel,
};
use super::loader::{Loader, Loaders};
use super::request::{
    AnomalyRequest, ClassifierRequest, EncoderRequest, Fingerprint, LanguageRequest,
    ModelRequest, TimeseriesRequest,
};
use crate::cache::{EvictionReason, TtlCache};
use crate::error::{MimirError, Result};
use crate::key::CacheKey;
use crate::telemetry;

type BuildOutcome = Result<(ModelHandle, Fingerprint)>;
type Flight = Shared<BoxFuture<'static, BuildOutcome>>;

struct InFlight {
    id: u64,
    fingerprint: Fingerprint,
    flight: Flight,
}

struct CoordinatorState {
    cache: TtlCache<ModelHandle, Fingerprint>,
    flights: Mutex<HashMap<CacheKey, InFlight>>,
    next_flight: AtomicU64,
    loaders: Loaders,
}

impl CoordinatorState {
    fn flights(&self) -> MutexGuard<'_, HashMap<CacheKey, InFlight>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Information about currently loaded models, as cache keys per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedModels {
    pub language: Vec<String>,
    pub encoder: Vec<String>,
    pub classifier: Vec<String>,
    pub anomaly: Vec<String>,
    pub timeseries: Vec<String>,
}

impl LoadedModels {
    /// Total number of loaded models across kinds.
    pub fn total(&self) -> usize {
        self.language.len()
            + self.encoder.len()
            + self.classifier.len()
            + self.anomaly.len()
            + self.timeseries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Coordinates cache lookups and model builds.
///
/// Cheap to clone; clones share the same cache and in-flight registry.
#[derive(Clone)]
pub struct LoadCoordinator {
    state: Arc<CoordinatorState>,
}

impl LoadCoordinator {
    /// Create a coordinator with the given loaders and entry TTL.
    pub fn new(loaders: Loaders, default_ttl: Duration) -> Self {
        Self {
            state: Arc::new(CoordinatorState {
                cache: TtlCache::new(default_ttl),
                flights: Mutex::new(HashMap::new()),
                next_flight: AtomicU64::new(0),
                loaders,
            }),
        }
    }

    /// Get a cached instance for `request`, building it if needed.
    pub async fn get_or_load<R: ModelRequest>(&self, request: &R) -> Result<Arc<R::Instance>> {
        let key = request.cache_key();
        let fingerprint = request.fingerprint();

        loop {
            if let Some(instance) = self.lookup::<R>(&key, &fingerprint) {
                return Ok(instance);
            }

            let (flight, flight_fingerprint) = self.join_or_start(&key, request)?;
            let outcome = flight.await;
            if flight_fingerprint != fingerprint {
                // Waited on a build for another configuration; start our own.
                continue;
            }

            let (handle, _) = outcome?;
            return R::unwrap(&handle).ok_or_else(|| {
                MimirError::build_failure(key.as_str(), "loader returned a model of another kind")
            });
        }
    }

    pub async fn get_or_load_language(
        &self,
        request: &LanguageRequest,
    ) -> Result<Arc<dyn LanguageModel>> {
        self.get_or_load(request).await
    }

    pub async fn get_or_load_encoder(
        &self,
        request: &EncoderRequest,
    ) -> Result<Arc<dyn EncoderModel>> {
        self.get_or_load(request).await
    }

    pub async fn get_or_load_classifier(
        &self,
        request: &ClassifierRequest,
    ) -> Result<Arc<dyn ClassifierModel>> {
        self.get_or_load(request).await
    }

    pub async fn get_or_load_anomaly(
        &self,
        request: &AnomalyRequest,
    ) -> Result<Arc<dyn AnomalyModel>> {
        self.get_or_load(request).await
    }

    pub async fn get_or_load_timeseries(
        &self,
        request: &TimeseriesRequest,
    ) -> Result<Arc<dyn TimeseriesModel>> {
        self.get_or_load(request).await
    }

    /// Unload and remove a cached model.
    ///
    /// Returns true if the model was found and removed.
    pub fn evict(&self, key: &CacheKey) -> bool {
        self.state.cache.evict(key)
    }

    /// Unload and remove every expired model. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.state.cache.sweep()
    }

    /// Unload and remove every cached model. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.state.cache.clear()
    }

    /// Whether a live model is cached under `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.cache.contains_key(key)
    }

    /// Number of builds currently running.
    pub fn in_flight(&self) -> usize {
        self.state.flights().len()
    }

    pub fn default_ttl(&self) -> Duration {
        self.state.cache.default_ttl()
    }

    /// Get information about currently loaded models.
    pub fn loaded_models(&self) -> LoadedModels {
        let mut loaded = LoadedModels::default();
        for key in self.state.cache.keys() {
            let slot = match key.kind() {
                Some(ModelKind::Language) => &mut loaded.language,
                Some(ModelKind::Encoder) => &mut loaded.encoder,
                Some(ModelKind::Classifier) => &mut loaded.classifier,
                Some(ModelKind::Anomaly) => &mut loaded.anomaly,
                Some(ModelKind::Timeseries) => &mut loaded.timeseries,
                None => continue,
            };
            slot.push(key.into());
        }
        loaded
    }

    fn lookup<R: ModelRequest>(
        &self,
        key: &CacheKey,
        fingerprint: &Fingerprint,
    ) -> Option<Arc<R::Instance>> {
        let kind = R::KIND.as_str();
        match self.state.cache.get(key) {
            Some((handle, cached)) if cached == *fingerprint => {
                metrics::counter!(telemetry::MODEL_CACHE_HITS_TOTAL, "kind" => kind).increment(1);
                debug!(key = %key, "model cache hit");
                R::unwrap(&handle)
            }
            Some(_) => {
                metrics::counter!(telemetry::MODEL_CACHE_MISSES_TOTAL, "kind" => kind)
                    .increment(1);
                let mismatch = MimirError::ConfigMismatch {
                    key: key.to_string(),
                };
                info!(%mismatch, "cached model was built with another configuration, rebuilding");
                None
            }
            None => {
                metrics::counter!(telemetry::MODEL_CACHE_MISSES_TOTAL, "kind" => kind)
                    .increment(1);
                None
            }
        }
    }

    fn join_or_start<R: ModelRequest>(
        &self,
        key: &CacheKey,
        request: &R,
    ) -> Result<(Flight, Fingerprint)> {
        let mut flights = self.state.flights();

        if let Some(in_flight) = flights.get(key) {
            debug!(key = %key, "joining in-flight build");
            return Ok((in_flight.flight.clone(), in_flight.fingerprint.clone()));
        }

        let loader = R::loader(&self.state.loaders)
            .ok_or(MimirError::NotInitialized(loader_slot(R::KIND)))?;
        let id = self.state.next_flight.fetch_add(1, Ordering::Relaxed);
        let fingerprint = request.fingerprint();

        // The registry lock is held until the flight is registered, so the
        // task's cleanup cannot run before the entry exists.
        let task = tokio::spawn(build(
            Arc::clone(&self.state),
            key.clone(),
            id,
            request.clone(),
            loader,
        ));
        let task_key = key.clone();
        let flight = async move {
            task.await.unwrap_or_else(|e| {
                Err(MimirError::build_failure(
                    task_key.as_str(),
                    format!("build task aborted: {e}"),
                ))
            })
        }
        .boxed()
        .shared();

        flights.insert(
            key.clone(),
            InFlight {
                id,
                fingerprint: fingerprint.clone(),
                flight: flight.clone(),
            },
        );
        Ok((flight, fingerprint))
    }
}

/// Removes the flight registration when its build task ends, however it ends.
struct FlightGuard {
    state: Arc<CoordinatorState>,
    key: CacheKey,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut flights = self.state.flights();
        if flights.get(&self.key).is_some_and(|f| f.id == self.id) {
            flights.remove(&self.key);
        }
    }
}

async fn build<R: ModelRequest>(
    state: Arc<CoordinatorState>,
    key: CacheKey,
    id: u64,
    request: R,
    loader: Arc<dyn Loader<R>>,
) -> BuildOutcome {
    let _guard = FlightGuard {
        state: Arc::clone(&state),
        key: key.clone(),
        id,
    };
    let fingerprint = request.fingerprint();

    match state.cache.get(&key) {
        Some((handle, cached)) if cached == fingerprint => {
            debug!(key = %key, "model was built while waiting");
            return Ok((handle, cached));
        }
        Some(_) => {
            state
                .cache
                .evict_if(&key, EvictionReason::Mismatch, |cached| *cached != fingerprint);
        }
        None => {}
    }

    let kind = R::KIND.as_str();
    info!(key = %key, kind, "building model");
    let started = Instant::now();

    let result: Result<ModelHandle> = async {
        let handle = R::wrap(loader.load(&request).await?);
        if let Err(e) = handle.model().load().await {
            handle.model().unload();
            return Err(e);
        }
        Ok(handle)
    }
    .await;

    let elapsed = started.elapsed();
    metrics::histogram!(telemetry::MODEL_BUILD_DURATION_SECONDS, "kind" => kind)
        .record(elapsed.as_secs_f64());

    match result {
        Ok(handle) => {
            metrics::counter!(telemetry::MODEL_BUILDS_TOTAL, "kind" => kind, "status" => "ok")
                .increment(1);
            state
                .cache
                .insert(key.clone(), handle.clone(), fingerprint.clone());
            info!(
                key = %key,
                model = handle.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "model ready"
            );
            Ok((handle, fingerprint))
        }
        Err(e) => {
            metrics::counter!(telemetry::MODEL_BUILDS_TOTAL, "kind" => kind, "status" => "error")
                .increment(1);
            warn!(key = %key, error = %e, "model build failed");
            Err(match e {
                MimirError::NotFound(_)
                | MimirError::NotInitialized(_)
                | MimirError::BuildFailure { .. } => e,
                other => MimirError::build_failure(key.as_str(), other),
            })
        }
    }
}

fn loader_slot(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::Language => "language loader",
        ModelKind::Encoder => "encoder loader",
        ModelKind::Classifier => "classifier loader",
        ModelKind::Anomaly => "anomaly loader",
        ModelKind::Timeseries => "timeseries loader",
    }
}
