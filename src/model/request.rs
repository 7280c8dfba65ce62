//! Per-kind load requests.
//!
//! A request carries everything that determines the behaviour of the model
//! instance it resolves to. Some fields are key components (model id,
//! context size, quantization, ...); the full request, normalized, is the
//! entry's fingerprint. Two requests with the same key but different
//! fingerprints cause the cached instance to be evicted and rebuilt.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::handle::{
    AnomalyModel, ClassifierModel, EncoderModel, LanguageModel, ModelHandle, ModelKind,
    TimeseriesModel,
};
use super::loader::{Loader, Loaders};
use super::Device;
use crate::key::{normalize_quantization, CacheKey};
use crate::MimirError;

/// Encoder task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderTask {
    Embedding,
    Rerank,
}

impl EncoderTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Rerank => "rerank",
        }
    }
}

impl fmt::Display for EncoderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncoderTask {
    type Err = MimirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedding" => Ok(Self::Embedding),
            "rerank" => Ok(Self::Rerank),
            _ => Err(MimirError::InvalidInput(format!("unknown encoder task '{s}'"))),
        }
    }
}

/// On-disk model format an encoder is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Gguf,
    Onnx,
    Safetensors,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gguf => "gguf",
            Self::Onnx => "onnx",
            Self::Safetensors => "safetensors",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = MimirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gguf" => Ok(Self::Gguf),
            "onnx" => Ok(Self::Onnx),
            "safetensors" => Ok(Self::Safetensors),
            _ => Err(MimirError::InvalidInput(format!("unknown model format '{s}'"))),
        }
    }
}

/// Request for a language model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageRequest {
    /// Model identity (e.g. `unsloth/Qwen3-1.7B-GGUF`).
    pub model_id: String,
    /// Context window size in tokens.
    pub n_ctx: u32,
    /// Quantization (e.g. `Q4_K_M`); `None` selects the default file.
    #[serde(default)]
    pub quantization: Option<String>,
    #[serde(default)]
    pub device: Device,
    /// Layers offloaded to the accelerator; `None` lets the adapter decide.
    #[serde(default)]
    pub n_gpu_layers: Option<u32>,
    #[serde(default)]
    pub flash_attention: bool,
}

impl LanguageRequest {
    pub fn new(model_id: impl Into<String>, n_ctx: u32) -> Self {
        Self {
            model_id: model_id.into(),
            n_ctx,
            quantization: None,
            device: Device::default(),
            n_gpu_layers: None,
            flash_attention: false,
        }
    }

    pub fn quantization(mut self, quantization: impl Into<String>) -> Self {
        self.quantization = Some(quantization.into());
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn n_gpu_layers(mut self, layers: u32) -> Self {
        self.n_gpu_layers = Some(layers);
        self
    }

    pub fn flash_attention(mut self, enabled: bool) -> Self {
        self.flash_attention = enabled;
        self
    }
}

/// Request for an encoder (embedding or rerank) model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncoderRequest {
    pub model_id: String,
    pub task: EncoderTask,
    pub format: ModelFormat,
    #[serde(default)]
    pub quantization: Option<String>,
    #[serde(default)]
    pub device: Device,
    /// Maximum input length in tokens; `None` uses the model's own limit.
    #[serde(default)]
    pub max_length: Option<u32>,
}

impl EncoderRequest {
    pub fn new(model_id: impl Into<String>, task: EncoderTask, format: ModelFormat) -> Self {
        Self {
            model_id: model_id.into(),
            task,
            format,
            quantization: None,
            device: Device::default(),
            max_length: None,
        }
    }

    pub fn quantization(mut self, quantization: impl Into<String>) -> Self {
        self.quantization = Some(quantization.into());
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Request for a fitted classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassifierRequest {
    pub model_id: String,
    /// Base encoder the classifier head was fitted on.
    pub base_model: String,
    #[serde(default)]
    pub device: Device,
}

impl ClassifierRequest {
    pub fn new(model_id: impl Into<String>, base_model: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            base_model: base_model.into(),
            device: Device::default(),
        }
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

/// Request for an anomaly detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnomalyRequest {
    pub model_id: String,
    /// Detection backend (e.g. `isolation-forest`).
    pub backend: String,
    /// Backend parameters; any change forces a rebuild.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl AnomalyRequest {
    pub fn new(model_id: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            backend: backend.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Request for a timeseries forecaster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeseriesRequest {
    pub model_id: String,
    /// Forecasting backend (e.g. `chronos`).
    pub backend: String,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TimeseriesRequest {
    pub fn new(model_id: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            backend: backend.into(),
            device: Device::default(),
            params: BTreeMap::new(),
        }
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Configuration fingerprint stored alongside each cache entry.
///
/// Compared by structural equality; a different variant never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Language(LanguageRequest),
    Encoder(EncoderRequest),
    Classifier(ClassifierRequest),
    Anomaly(AnomalyRequest),
    Timeseries(TimeseriesRequest),
}

impl Fingerprint {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Language(_) => ModelKind::Language,
            Self::Encoder(_) => ModelKind::Encoder,
            Self::Classifier(_) => ModelKind::Classifier,
            Self::Anomaly(_) => ModelKind::Anomaly,
            Self::Timeseries(_) => ModelKind::Timeseries,
        }
    }
}

/// Glue between a request type, its key, its fingerprint, its handle
/// variant, and its loader slot.
///
/// Implemented for the five request types; the coordinator is generic over
/// it so the check/build/insert sequence is written once.
pub trait ModelRequest: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Model trait object produced for this request.
    type Instance: ?Sized + Send + Sync + 'static;

    const KIND: ModelKind;

    fn cache_key(&self) -> CacheKey;

    fn fingerprint(&self) -> Fingerprint;

    fn wrap(instance: Arc<Self::Instance>) -> ModelHandle;

    fn unwrap(handle: &ModelHandle) -> Option<Arc<Self::Instance>>;

    fn loader(loaders: &Loaders) -> Option<Arc<dyn Loader<Self>>>;
}

fn normalized(quantization: &Option<String>) -> Option<String> {
    normalize_quantization(quantization.as_deref()).map(str::to_string)
}

impl ModelRequest for LanguageRequest {
    type Instance = dyn LanguageModel;

    const KIND: ModelKind = ModelKind::Language;

    fn cache_key(&self) -> CacheKey {
        CacheKey::language(&self.model_id, self.n_ctx, self.quantization.as_deref())
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Language(Self {
            quantization: normalized(&self.quantization),
            ..self.clone()
        })
    }

    fn wrap(instance: Arc<Self::Instance>) -> ModelHandle {
        ModelHandle::Language(instance)
    }

    fn unwrap(handle: &ModelHandle) -> Option<Arc<Self::Instance>> {
        match handle {
            ModelHandle::Language(m) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    fn loader(loaders: &Loaders) -> Option<Arc<dyn Loader<Self>>> {
        loaders.language.clone()
    }
}

impl ModelRequest for EncoderRequest {
    type Instance = dyn EncoderModel;

    const KIND: ModelKind = ModelKind::Encoder;

    fn cache_key(&self) -> CacheKey {
        CacheKey::encoder(
            self.task,
            self.format,
            &self.model_id,
            self.quantization.as_deref(),
        )
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Encoder(Self {
            quantization: normalized(&self.quantization),
            ..self.clone()
        })
    }

    fn wrap(instance: Arc<Self::Instance>) -> ModelHandle {
        ModelHandle::Encoder(instance)
    }

    fn unwrap(handle: &ModelHandle) -> Option<Arc<Self::Instance>> {
        match handle {
            ModelHandle::Encoder(m) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    fn loader(loaders: &Loaders) -> Option<Arc<dyn Loader<Self>>> {
        loaders.encoder.clone()
    }
}

impl ModelRequest for ClassifierRequest {
    type Instance = dyn ClassifierModel;

    const KIND: ModelKind = ModelKind::Classifier;

    fn cache_key(&self) -> CacheKey {
        CacheKey::classifier(&self.model_id)
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Classifier(self.clone())
    }

    fn wrap(instance: Arc<Self::Instance>) -> ModelHandle {
        ModelHandle::Classifier(instance)
    }

    fn unwrap(handle: &ModelHandle) -> Option<Arc<Self::Instance>> {
        match handle {
            ModelHandle::Classifier(m) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    fn loader(loaders: &Loaders) -> Option<Arc<dyn Loader<Self>>> {
        loaders.classifier.clone()
    }
}

impl ModelRequest for AnomalyRequest {
    type Instance = dyn AnomalyModel;

    const KIND: ModelKind = ModelKind::Anomaly;

    fn cache_key(&self) -> CacheKey {
        CacheKey::anomaly(&self.backend, &self.model_id)
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Anomaly(self.clone())
    }

    fn wrap(instance: Arc<Self::Instance>) -> ModelHandle {
        ModelHandle::Anomaly(instance)
    }

    fn unwrap(handle: &ModelHandle) -> Option<Arc<Self::Instance>> {
        match handle {
            ModelHandle::Anomaly(m) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    fn loader(loaders: &Loaders) -> Option<Arc<dyn Loader<Self>>> {
        loaders.anomaly.clone()
    }
}

impl ModelRequest for TimeseriesRequest {
    type Instance = dyn TimeseriesModel;

    const KIND: ModelKind = ModelKind::Timeseries;

    fn cache_key(&self) -> CacheKey {
        CacheKey::timeseries(&self.backend, &self.model_id)
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Timeseries(self.clone())
    }

    fn wrap(instance: Arc<Self::Instance>) -> ModelHandle {
        ModelHandle::Timeseries(instance)
    }

    fn unwrap(handle: &ModelHandle) -> Option<Arc<Self::Instance>> {
        match handle {
            ModelHandle::Timeseries(m) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    fn loader(loaders: &Loaders) -> Option<Arc<dyn Loader<Self>>> {
        loaders.timeseries.clone()
    }
}
