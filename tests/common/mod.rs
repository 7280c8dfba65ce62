//! Shared fixtures: counting test models, loaders and a GGUF header writer.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use mimir::{
    AnomalyModel, Classification, ClassifierModel, ClassifierRequest, EncoderModel,
    LanguageModel, LanguageRequest, Loader, MimirError, Model, Result, TimeseriesModel,
    loader_fn,
};

// ============================================================================
// Test models
// ============================================================================

/// Build and unload counters shared between a loader and its models.
#[derive(Default)]
pub struct Counters {
    builds: AtomicUsize,
    unloads: AtomicUsize,
    fail_next: AtomicBool,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    /// Make the next build fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

/// Model that answers every kind trait and counts unloads.
pub struct TestModel {
    name: String,
    counters: Arc<Counters>,
}

impl TestModel {
    pub fn new(name: impl Into<String>, counters: Arc<Counters>) -> Self {
        Self {
            name: name.into(),
            counters,
        }
    }
}

#[async_trait]
impl Model for TestModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn unload(&self) {
        self.counters.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LanguageModel for TestModel {
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        Ok(format!("{}: {prompt}", self.name))
    }
}

#[async_trait]
impl EncoderModel for TestModel {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
    }
}

#[async_trait]
impl ClassifierModel for TestModel {
    async fn classify(&self, texts: &[&str]) -> Result<Vec<Classification>> {
        Ok(texts
            .iter()
            .map(|_| Classification {
                label: self.name.clone(),
                score: 1.0,
            })
            .collect())
    }
}

#[async_trait]
impl AnomalyModel for TestModel {
    async fn score(&self, samples: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(samples.iter().map(|s| s.iter().sum()).collect())
    }
}

#[async_trait]
impl TimeseriesModel for TestModel {
    async fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>> {
        Ok(vec![history.last().copied().unwrap_or_default(); horizon])
    }
}

// ============================================================================
// Loaders
// ============================================================================

async fn begin_build(counters: &Counters, delay: Duration) -> Result<()> {
    counters.builds.fetch_add(1, Ordering::SeqCst);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if counters.fail_next.swap(false, Ordering::SeqCst) {
        return Err(MimirError::Io("weights unreadable".to_string()));
    }
    Ok(())
}

/// Language loader naming models `{model_id}@{n_ctx}`.
pub fn language_loader(counters: Arc<Counters>, delay: Duration) -> impl Loader<LanguageRequest> {
    loader_fn(move |request: LanguageRequest| {
        let counters = Arc::clone(&counters);
        async move {
            begin_build(&counters, delay).await?;
            let name = format!("{}@{}", request.model_id, request.n_ctx);
            let model: Arc<dyn LanguageModel> = Arc::new(TestModel::new(name, counters));
            Ok::<_, MimirError>(model)
        }
    })
}

/// Classifier loader naming models after their base model.
pub fn classifier_loader(
    counters: Arc<Counters>,
    delay: Duration,
) -> impl Loader<ClassifierRequest> {
    loader_fn(move |request: ClassifierRequest| {
        let counters = Arc::clone(&counters);
        async move {
            begin_build(&counters, delay).await?;
            let model: Arc<dyn ClassifierModel> =
                Arc::new(TestModel::new(request.base_model, counters));
            Ok::<_, MimirError>(model)
        }
    })
}

// ============================================================================
// GGUF fixtures
// ============================================================================

/// Writes minimal GGUF v3 headers (metadata only, no tensors).
#[derive(Default)]
pub struct GgufWriter {
    count: u64,
    body: Vec<u8>,
}

impl GgufWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(mut self, key: &str, ty: u32) -> Self {
        self.count += 1;
        self.raw_str(key);
        self.body.extend_from_slice(&ty.to_le_bytes());
        self
    }

    fn raw_str(&mut self, s: &str) {
        self.body.extend_from_slice(&(s.len() as u64).to_le_bytes());
        self.body.extend_from_slice(s.as_bytes());
    }

    pub fn string(self, key: &str, value: &str) -> Self {
        let mut w = self.key(key, 8);
        w.raw_str(value);
        w
    }

    pub fn u32(self, key: &str, value: u32) -> Self {
        let mut w = self.key(key, 4);
        w.body.extend_from_slice(&value.to_le_bytes());
        w
    }

    pub fn f32(self, key: &str, value: f32) -> Self {
        let mut w = self.key(key, 6);
        w.body.extend_from_slice(&value.to_le_bytes());
        w
    }

    pub fn strings(self, key: &str, values: &[&str]) -> Self {
        let mut w = self.key(key, 9);
        w.body.extend_from_slice(&8u32.to_le_bytes());
        w.body.extend_from_slice(&(values.len() as u64).to_le_bytes());
        for v in values {
            w.raw_str(v);
        }
        w
    }

    pub fn f32s(self, key: &str, values: &[f32]) -> Self {
        let mut w = self.key(key, 9);
        w.body.extend_from_slice(&6u32.to_le_bytes());
        w.body.extend_from_slice(&(values.len() as u64).to_le_bytes());
        for v in values {
            w.body.extend_from_slice(&v.to_le_bytes());
        }
        w
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"GGUF");
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.bytes()).unwrap();
    }
}

/// A small llama-style header with vocabulary and chat template.
pub fn llama_header(context_length: u32) -> GgufWriter {
    GgufWriter::new()
        .string("general.architecture", "llama")
        .string("general.name", "tiny-llama")
        .u32("llama.context_length", context_length)
        .u32("llama.block_count", 22)
        .u32("llama.embedding_length", 2048)
        .u32("llama.attention.head_count", 32)
        .u32("llama.attention.head_count_kv", 4)
        .f32("llama.rope.freq_base", 10000.0)
        .strings("tokenizer.ggml.tokens", &["<unk>", "<s>", "</s>", "hello"])
        .f32s("tokenizer.ggml.scores", &[0.0, 0.0, 0.0, -1.5])
        .u32("tokenizer.ggml.bos_token_id", 1)
        .u32("tokenizer.ggml.eos_token_id", 2)
        .string(
            "tokenizer.chat_template",
            "{% for m in messages %}{{ m.content }}{% endfor %}",
        )
}
