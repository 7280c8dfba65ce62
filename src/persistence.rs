//! Best-effort persistence of freshly fitted models.
//!
//! Each model is saved under `{models_dir}/{slug}/` as `model.bin` plus a
//! `manifest.json`. Saving never touches the in-memory cache: a failed save
//! leaves the fitted instance usable for the rest of the process.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MimirError, Result};
use crate::model::blocking;
use crate::telemetry;

const MODEL_FILE: &str = "model.bin";
const MANIFEST_FILE: &str = "manifest.json";

/// A fitted model that can serialize itself.
pub trait Persist: Send + Sync {
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// Sidecar describing a saved model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveManifest {
    /// Name the model was saved under.
    pub name: String,
    /// Directory name derived from `name`.
    pub slug: String,
    pub size_bytes: u64,
    pub saved_at_unix: u64,
}

/// Writes fitted models to a name-derived location under `models_dir`.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    models_dir: PathBuf,
}

impl PersistenceManager {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Directory a model named `name` is saved to.
    pub fn model_dir(&self, name: &str) -> Result<PathBuf> {
        Ok(self.models_dir.join(slug(name)?))
    }

    /// Whether a saved model exists under `name`.
    pub fn exists(&self, name: &str) -> bool {
        self.model_dir(name)
            .is_ok_and(|dir| dir.join(MODEL_FILE).is_file())
    }

    /// Save `model` under `name`, logging and swallowing any failure.
    ///
    /// Returns the directory written to, or `None` if the save failed.
    pub async fn save_after_fit(&self, model: &dyn Persist, name: &str) -> Option<PathBuf> {
        match self.try_save(model, name).await {
            Ok(dir) => Some(dir),
            Err(e) => {
                metrics::counter!(telemetry::PERSISTENCE_FAILURES_TOTAL).increment(1);
                warn!(model = name, error = %e, "failed to persist fitted model");
                None
            }
        }
    }

    /// Save `model` under `name`, propagating any failure.
    pub async fn try_save(&self, model: &dyn Persist, name: &str) -> Result<PathBuf> {
        let slug = slug(name)?;
        let dir = self.models_dir.join(&slug);
        let bytes = model
            .to_bytes()
            .map_err(|e| MimirError::PersistenceFailure(format!("serialize '{name}': {e}")))?;
        let manifest = SaveManifest {
            name: name.to_string(),
            slug,
            size_bytes: bytes.len() as u64,
            saved_at_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };

        let target = dir.clone();
        blocking(move || write_model(&target, &bytes, &manifest)).await?;
        info!(model = name, dir = %dir.display(), "persisted fitted model");
        Ok(dir)
    }

    /// Read back the bytes saved under `name`.
    pub async fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.model_dir(name)?.join(MODEL_FILE);
        blocking(move || {
            std::fs::read(&path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    MimirError::NotFound(format!("saved model {}", path.display()))
                }
                _ => MimirError::from(e),
            })
        })
        .await
    }

    /// Read the manifest saved under `name`.
    pub async fn manifest(&self, name: &str) -> Result<SaveManifest> {
        let path = self.model_dir(name)?.join(MANIFEST_FILE);
        blocking(move || {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        })
        .await
    }
}

/// Keep `[A-Za-z0-9._-]`, percent-encode every other byte.
///
/// `%` is itself encoded, so distinct names never share a directory.
fn slug(name: &str) -> Result<String> {
    let mut slug = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            slug.push(char::from(byte));
        } else {
            slug.push_str(&format!("%{byte:02X}"));
        }
    }
    match slug.as_str() {
        "" | "." | ".." => Err(MimirError::InvalidInput(format!(
            "'{name}' is not a valid model name"
        ))),
        _ => Ok(slug),
    }
}

fn write_model(dir: &Path, bytes: &[u8], manifest: &SaveManifest) -> Result<()> {
    let persistence = |what: &str, path: &Path, e: &dyn std::fmt::Display| {
        MimirError::PersistenceFailure(format!("failed to {what} {}: {e}", path.display()))
    };

    std::fs::create_dir_all(dir).map_err(|e| persistence("create", dir, &e))?;

    let json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| persistence("serialize manifest for", dir, &e))?;
    for (file, content) in [(MODEL_FILE, bytes), (MANIFEST_FILE, json.as_slice())] {
        let path = dir.join(file);
        let tmp_path = dir.join(format!("{file}.tmp"));
        std::fs::write(&tmp_path, content).map_err(|e| persistence("write", &tmp_path, &e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| persistence("rename", &tmp_path, &e))?;
    }
    Ok(())
}
