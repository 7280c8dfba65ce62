//! Per-kind async model factories.
//!
//! A loader is only invoked by the coordinator on a confirmed miss, at most
//! once per key at a time. Loaders must not run blocking work (file I/O,
//! weight decoding, native initialization) directly on the async scheduler;
//! wrap it in [`blocking`] so unrelated requests keep making progress.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::request::{
    AnomalyRequest, ClassifierRequest, EncoderRequest, LanguageRequest, ModelRequest,
    TimeseriesRequest,
};
use crate::error::{MimirError, Result};

/// Factory for one model kind.
#[async_trait]
pub trait Loader<R: ModelRequest>: Send + Sync {
    /// Build the model instance described by `request`.
    async fn load(&self, request: &R) -> Result<Arc<R::Instance>>;
}

/// Loader backed by an async closure. Build one with [`loader_fn`].
pub struct FnLoader<F>(F);

/// Wrap an async closure as a [`Loader`].
///
/// ```rust,ignore
/// let loader = mimir::loader_fn(|request: ClassifierRequest| async move {
///     let model: Arc<dyn ClassifierModel> = Arc::new(MyClassifier::open(&request)?);
///     Ok::<_, MimirError>(model)
/// });
/// ```
pub fn loader_fn<F>(f: F) -> FnLoader<F> {
    FnLoader(f)
}

#[async_trait]
impl<R, F, Fut> Loader<R> for FnLoader<F>
where
    R: ModelRequest,
    F: Fn(R) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Arc<R::Instance>>> + Send + 'static,
{
    async fn load(&self, request: &R) -> Result<Arc<R::Instance>> {
        (self.0)(request.clone()).await
    }
}

/// Loader slots, one per model kind. Empty slots yield `NotInitialized`.
#[derive(Clone, Default)]
pub struct Loaders {
    pub language: Option<Arc<dyn Loader<LanguageRequest>>>,
    pub encoder: Option<Arc<dyn Loader<EncoderRequest>>>,
    pub classifier: Option<Arc<dyn Loader<ClassifierRequest>>>,
    pub anomaly: Option<Arc<dyn Loader<AnomalyRequest>>>,
    pub timeseries: Option<Arc<dyn Loader<TimeseriesRequest>>>,
}

impl std::fmt::Debug for Loaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loaders")
            .field("language", &self.language.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("classifier", &self.classifier.is_some())
            .field("anomaly", &self.anomaly.is_some())
            .field("timeseries", &self.timeseries.is_some())
            .finish()
    }
}

/// Run blocking work on tokio's blocking pool.
///
/// A panic inside `f` surfaces as `BuildFailure` under the key
/// `"blocking"`; loaders usually re-wrap it with their own key.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MimirError::build_failure("blocking", e))?
}
