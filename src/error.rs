//! Mimir error types

/// Mimir error types.
///
/// Cloneable so that a single failed build can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MimirError {
    // Wiring errors
    /// A required collaborator (loader, store) was never configured.
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),

    // Lookup errors
    #[error("not found: {0}")]
    NotFound(String),

    // Build errors
    /// The kind-specific loader failed; the key stays absent from the cache.
    #[error("failed to build model for '{key}': {message}")]
    BuildFailure { key: String, message: String },

    /// Cached fingerprint differs from the request's. Handled internally by
    /// evict + rebuild and never returned from the public API.
    #[error("configuration mismatch for '{key}'")]
    ConfigMismatch { key: String },

    // Persistence errors
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    // Data errors
    #[error("invalid GGUF file: {0}")]
    InvalidGguf(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MimirError {
    /// Wrap an arbitrary loader error as a build failure for `key`.
    pub fn build_failure(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::BuildFailure {
            key: key.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error means the referenced file or model does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for MimirError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            MimirError::NotFound(err.to_string())
        } else {
            MimirError::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MimirError {
    fn from(err: serde_json::Error) -> Self {
        MimirError::Json(err.to_string())
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
