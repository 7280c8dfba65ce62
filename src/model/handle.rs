//! Model capability traits and the type-erased handle stored in the cache.
//!
//! Inference adapters live outside this crate. The cache only needs
//! `load`/`unload` plus whatever task-specific operation the caller will
//! invoke, so each kind gets a narrow trait on top of [`Model`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Model kind, one per cache key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Language,
    Encoder,
    Classifier,
    Anomaly,
    Timeseries,
}

impl ModelKind {
    /// Every kind, in key-prefix order.
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Language,
        ModelKind::Encoder,
        ModelKind::Classifier,
        ModelKind::Anomaly,
        ModelKind::Timeseries,
    ];

    /// Key prefix / metric label for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Encoder => "encoder",
            Self::Classifier => "classifier",
            Self::Anomaly => "anomaly",
            Self::Timeseries => "timeseries",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle shared by every cached model.
///
/// `load` is awaited once by the coordinator right after the loader returns
/// and before the model is published to the cache. `unload` is called exactly
/// once, synchronously, when the owning cache entry is evicted; it must
/// release memory and accelerator state without waiting on the scheduler.
#[async_trait]
pub trait Model: Send + Sync {
    /// Human-readable model name for logging.
    fn name(&self) -> &str;

    /// Finish initialization (weights, sessions, warmup).
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    /// Release all resources held by the model.
    fn unload(&self);
}

/// Causal language model (text generation).
#[async_trait]
pub trait LanguageModel: Model {
    /// Generate a completion for an already-rendered prompt.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Chat template the model was configured with, if any.
    fn chat_template(&self) -> Option<&str> {
        None
    }
}

/// Encoder model (embeddings, reranking).
#[async_trait]
pub trait EncoderModel: Model {
    /// Embed each text into a dense vector.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Score each document against `query`.
    async fn rerank(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
        Err(crate::MimirError::Unsupported("rerank"))
    }
}

/// A single classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

/// Fitted text classifier.
#[async_trait]
pub trait ClassifierModel: Model {
    async fn classify(&self, texts: &[&str]) -> Result<Vec<Classification>>;
}

/// Fitted anomaly detector.
#[async_trait]
pub trait AnomalyModel: Model {
    /// Anomaly score per sample (higher is more anomalous).
    async fn score(&self, samples: &[Vec<f64>]) -> Result<Vec<f64>>;
}

/// Timeseries forecaster.
#[async_trait]
pub trait TimeseriesModel: Model {
    async fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>>;
}

/// Type-erased model handle, one variant per kind.
#[derive(Clone)]
pub enum ModelHandle {
    Language(Arc<dyn LanguageModel>),
    Encoder(Arc<dyn EncoderModel>),
    Classifier(Arc<dyn ClassifierModel>),
    Anomaly(Arc<dyn AnomalyModel>),
    Timeseries(Arc<dyn TimeseriesModel>),
}

impl ModelHandle {
    /// Kind of the wrapped model.
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Language(_) => ModelKind::Language,
            Self::Encoder(_) => ModelKind::Encoder,
            Self::Classifier(_) => ModelKind::Classifier,
            Self::Anomaly(_) => ModelKind::Anomaly,
            Self::Timeseries(_) => ModelKind::Timeseries,
        }
    }

    /// The wrapped model viewed through its lifecycle trait.
    pub fn model(&self) -> &dyn Model {
        match self {
            Self::Language(m) => m.as_ref(),
            Self::Encoder(m) => m.as_ref(),
            Self::Classifier(m) => m.as_ref(),
            Self::Anomaly(m) => m.as_ref(),
            Self::Timeseries(m) => m.as_ref(),
        }
    }

    pub fn name(&self) -> &str {
        self.model().name()
    }

    /// Whether both handles point at the same model instance.
    pub fn ptr_eq(&self, other: &ModelHandle) -> bool {
        match (self, other) {
            (Self::Language(a), Self::Language(b)) => Arc::ptr_eq(a, b),
            (Self::Encoder(a), Self::Encoder(b)) => Arc::ptr_eq(a, b),
            (Self::Classifier(a), Self::Classifier(b)) => Arc::ptr_eq(a, b),
            (Self::Anomaly(a), Self::Anomaly(b)) => Arc::ptr_eq(a, b),
            (Self::Timeseries(a), Self::Timeseries(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl crate::cache::Unload for ModelHandle {
    fn unload(&self) {
        self.model().unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Dummy {
        unloaded: AtomicBool,
    }

    #[async_trait]
    impl Model for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }

        fn unload(&self) {
            self.unloaded.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl EncoderModel for Dummy {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn dummy() -> Arc<Dummy> {
        Arc::new(Dummy {
            unloaded: AtomicBool::new(false),
        })
    }

    #[test]
    fn kind_round_trips_through_prefix() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn handle_reports_kind_and_name() {
        let handle = ModelHandle::Encoder(dummy());
        assert_eq!(handle.kind(), ModelKind::Encoder);
        assert_eq!(handle.name(), "dummy");
        assert!(format!("{handle:?}").contains("Encoder"));
    }

    #[test]
    fn unload_reaches_the_model() {
        use crate::cache::Unload;

        let model = dummy();
        let handle = ModelHandle::Encoder(model.clone());
        handle.unload();
        assert!(model.unloaded.load(Ordering::SeqCst));
    }

    #[test]
    fn ptr_eq_distinguishes_instances() {
        let model = dummy();
        let a = ModelHandle::Encoder(model.clone());
        let b = ModelHandle::Encoder(model);
        let c = ModelHandle::Encoder(dummy());
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[tokio::test]
    async fn default_rerank_is_unsupported() {
        let model = dummy();
        let err = model.rerank("q", &["d"]).await.unwrap_err();
        assert_eq!(err, crate::MimirError::Unsupported("rerank"));
    }
}
