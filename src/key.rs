//! Canonical cache keys.
//!
//! Keys are plain strings with a fixed grammar per model kind:
//!
//! ```text
//! language:{model_id}:ctx{n_ctx}:quant{quantization|"default"}
//! encoder:{task}:{model_format}:{model_id}:quant{quantization|"default"}
//! classifier:{model_id}
//! anomaly:{backend}:{model_id}
//! timeseries:{backend}:{model_id}
//! ```
//!
//! A missing (or empty) quantization renders as the literal `default`.
//! Free-form components are escaped (`%` -> `%25`, `:` -> `%3A`) so a
//! separator inside an identifier can never make two different requests
//! render the same key. Identifiers without those characters render
//! verbatim.

use std::borrow::{Borrow, Cow};
use std::fmt;

use crate::model::{EncoderTask, ModelFormat, ModelKind};

/// Token used in place of an unspecified quantization.
pub const DEFAULT_QUANTIZATION: &str = "default";

/// Opaque, deterministic cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a language model.
    ///
    /// ```rust
    /// # use mimir::CacheKey;
    /// let key = CacheKey::language("unsloth/Qwen3-1.7B-GGUF", 8192, Some("Q4_K_M"));
    /// assert_eq!(key.as_str(), "language:unsloth/Qwen3-1.7B-GGUF:ctx8192:quantQ4_K_M");
    /// ```
    pub fn language(model_id: &str, n_ctx: u32, quantization: Option<&str>) -> Self {
        Self(format!(
            "{}:{}:ctx{n_ctx}:quant{}",
            ModelKind::Language,
            escape(model_id),
            quantization_token(quantization)
        ))
    }

    /// Key for an encoder (embedding / rerank) model.
    pub fn encoder(
        task: EncoderTask,
        format: ModelFormat,
        model_id: &str,
        quantization: Option<&str>,
    ) -> Self {
        Self(format!(
            "{}:{task}:{format}:{}:quant{}",
            ModelKind::Encoder,
            escape(model_id),
            quantization_token(quantization)
        ))
    }

    /// Key for a fitted classifier.
    pub fn classifier(model_id: &str) -> Self {
        Self(format!("{}:{}", ModelKind::Classifier, escape(model_id)))
    }

    /// Key for an anomaly detector.
    pub fn anomaly(backend: &str, model_id: &str) -> Self {
        Self(format!(
            "{}:{}:{}",
            ModelKind::Anomaly,
            escape(backend),
            escape(model_id)
        ))
    }

    /// Key for a timeseries forecaster.
    pub fn timeseries(backend: &str, model_id: &str) -> Self {
        Self(format!(
            "{}:{}:{}",
            ModelKind::Timeseries,
            escape(backend),
            escape(model_id)
        ))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Model kind encoded in the key prefix.
    pub fn kind(&self) -> Option<ModelKind> {
        let prefix = self.0.split(':').next()?;
        ModelKind::ALL.into_iter().find(|k| k.as_str() == prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Normalize a quantization parameter: `None` and `""` both mean "default".
pub fn normalize_quantization(quantization: Option<&str>) -> Option<&str> {
    quantization.filter(|q| !q.is_empty() && *q != DEFAULT_QUANTIZATION)
}

fn quantization_token(quantization: Option<&str>) -> Cow<'_, str> {
    match normalize_quantization(quantization) {
        Some(q) => escape(q),
        None => Cow::Borrowed(DEFAULT_QUANTIZATION),
    }
}

fn escape(component: &str) -> Cow<'_, str> {
    if !component.contains([':', '%']) {
        return Cow::Borrowed(component);
    }
    let mut out = String::with_capacity(component.len() + 8);
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_key_with_quantization() {
        let key = CacheKey::language("unsloth/Qwen3-1.7B-GGUF", 8192, Some("Q4_K_M"));
        assert_eq!(
            key.as_str(),
            "language:unsloth/Qwen3-1.7B-GGUF:ctx8192:quantQ4_K_M"
        );
    }

    #[test]
    fn language_key_without_quantization_uses_default_token() {
        let key = CacheKey::language("unsloth/Qwen3-1.7B-GGUF", 8192, None);
        assert_eq!(
            key.as_str(),
            "language:unsloth/Qwen3-1.7B-GGUF:ctx8192:quantdefault"
        );
    }

    #[test]
    fn empty_quantization_is_default() {
        let a = CacheKey::language("m", 2048, Some(""));
        let b = CacheKey::language("m", 2048, None);
        assert_eq!(a, b);
        assert!(a.as_str().ends_with(":quantdefault"));
    }

    #[test]
    fn encoder_key() {
        let key = CacheKey::encoder(
            EncoderTask::Embedding,
            ModelFormat::Gguf,
            "m",
            Some("Q8_0"),
        );
        assert_eq!(key.as_str(), "encoder:embedding:gguf:m:quantQ8_0");
    }

    #[test]
    fn classifier_key() {
        assert_eq!(CacheKey::classifier("foo").as_str(), "classifier:foo");
    }

    #[test]
    fn anomaly_and_timeseries_keys() {
        assert_eq!(
            CacheKey::anomaly("isolation-forest", "sensors").as_str(),
            "anomaly:isolation-forest:sensors"
        );
        assert_eq!(
            CacheKey::timeseries("chronos", "sales").as_str(),
            "timeseries:chronos:sales"
        );
    }

    #[test]
    fn key_is_deterministic() {
        let a = CacheKey::language("m", 4096, Some("Q4_K_M"));
        let b = CacheKey::language("m", 4096, Some("Q4_K_M"));
        assert_eq!(a, b);
    }

    #[test]
    fn every_dimension_changes_the_key() {
        let base = CacheKey::language("m", 4096, Some("Q4_K_M"));
        assert_ne!(base, CacheKey::language("n", 4096, Some("Q4_K_M")));
        assert_ne!(base, CacheKey::language("m", 8192, Some("Q4_K_M")));
        assert_ne!(base, CacheKey::language("m", 4096, Some("Q8_0")));
        assert_ne!(base, CacheKey::language("m", 4096, None));

        let enc = CacheKey::encoder(EncoderTask::Embedding, ModelFormat::Gguf, "m", None);
        assert_ne!(
            enc,
            CacheKey::encoder(EncoderTask::Rerank, ModelFormat::Gguf, "m", None)
        );
        assert_ne!(
            enc,
            CacheKey::encoder(EncoderTask::Embedding, ModelFormat::Onnx, "m", None)
        );
    }

    #[test]
    fn kinds_never_collide() {
        let classifier = CacheKey::classifier("x");
        let anomaly = CacheKey::anomaly("a", "x");
        assert_ne!(classifier, anomaly);
        assert_eq!(classifier.kind(), Some(ModelKind::Classifier));
        assert_eq!(anomaly.kind(), Some(ModelKind::Anomaly));
    }

    #[test]
    fn separators_inside_components_are_escaped() {
        // Without escaping both would render "language:m:ctx8:quantQ:ctx9:quantX".
        let a = CacheKey::language("m:ctx8:quantQ", 9, Some("X"));
        let b = CacheKey::language("m", 8, Some("Q:ctx9:quantX"));
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "language:m%3Actx8%3AquantQ:ctx9:quantX");
    }

    #[test]
    fn percent_is_escaped() {
        let a = CacheKey::classifier("a%3Ab");
        let b = CacheKey::classifier("a:b");
        assert_ne!(a, b);
    }

    #[test]
    fn kind_of_foreign_key_is_none() {
        let key = CacheKey("unknown:thing".to_string());
        assert_eq!(key.kind(), None);
    }
}
