//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (`--config <path>` in the CLI)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//!
//! Every field has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_METADATA_CACHE_MAX;
use crate::{MimirError, Result};

/// Environment variable overriding the default models directory.
pub const MODELS_DIR_ENV: &str = "MIMIR_MODELS_DIR";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Model instance cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Idle time after which a cached model is unloaded (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Interval between expiry sweeps; 0 disables the sweeper (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

/// GGUF metadata cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Maximum number of cached files (default: 1000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_entries() -> u64 {
    DEFAULT_METADATA_CACHE_MAX
}

/// Fitted model persistence settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistenceConfig {
    /// Root directory for saved models.
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
}

impl PersistenceConfig {
    /// Configured directory, else `$MIMIR_MODELS_DIR`, else
    /// `{data_dir}/mimir/models`.
    pub fn resolved_models_dir(&self) -> PathBuf {
        self.models_dir.clone().unwrap_or_else(default_models_dir)
    }
}

/// Default models directory: `$MIMIR_MODELS_DIR` or `~/.local/share/mimir/models`.
pub fn default_models_dir() -> PathBuf {
    std::env::var(MODELS_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from(".local/share"))
                .join("mimir")
                .join("models")
        })
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.mimir/config.toml`
    /// 3. `/etc/mimir/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::from_file(&path)
    }

    /// Like [`Config::load`], but defaults apply when no config file exists.
    ///
    /// A config file that exists but cannot be read, parsed or validated is
    /// still an error.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match explicit_path {
            Some(path) => Self::load(Some(path)),
            None => Self::from_optional_file(Self::discover_config_path().as_deref()),
        }
    }

    fn from_optional_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a specific config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot produce a working cache.
    pub fn validate(&self) -> Result<()> {
        if self.cache.default_ttl_secs == 0 {
            return Err(MimirError::Configuration(
                "cache.default_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.metadata.max_entries == 0 {
            return Err(MimirError::Configuration(
                "metadata.max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// First of `~/.mimir/config.toml` and `/etc/mimir/config.toml` that exists.
    fn discover_config_path() -> Option<PathBuf> {
        let user_config = dirs::home_dir().map(|home| home.join(".mimir").join("config.toml"));
        user_config
            .into_iter()
            .chain(std::iter::once(PathBuf::from("/etc/mimir/config.toml")))
            .find(|path| path.exists())
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(path) = Self::discover_config_path() {
            return Ok(path);
        }

        Err(MimirError::Configuration(
            "No config file found. Create ~/.mimir/config.toml or /etc/mimir/config.toml"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.metadata.max_entries, 1000);
        assert!(config.persistence.models_dir.is_none());
    }

    #[test]
    fn parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.sweep_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [cache]
            default_ttl_secs = 600
            sweep_interval_secs = 0

            [metadata]
            max_entries = 50

            [persistence]
            models_dir = "/srv/models"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(600));
        assert_eq!(config.cache.sweep_interval(), None);
        assert_eq!(config.metadata.max_entries, 50);
        assert_eq!(
            config.persistence.resolved_models_dir(),
            PathBuf::from("/srv/models")
        );
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config: Config = toml::from_str("[cache]\ndefault_ttl_secs = 0").unwrap();
        assert!(matches!(
            config.validate(),
            Err(MimirError::Configuration(_))
        ));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/mimir.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[metadata]\nmax_entries = 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.metadata.max_entries, 7);
        assert_eq!(config.cache.default_ttl_secs, 3600);
    }

    #[test]
    fn invalid_toml_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache\n").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(MimirError::Configuration(_))
        ));
    }

    #[test]
    fn absent_config_file_falls_back_to_defaults() {
        let config = Config::from_optional_file(None).unwrap();
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert_eq!(config.metadata.max_entries, 1000);
    }

    #[test]
    fn malformed_config_file_is_not_replaced_by_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[metadata]\nmax_entries = 0\n").unwrap();

        assert!(matches!(
            Config::from_optional_file(Some(&path)),
            Err(MimirError::Configuration(_))
        ));
        assert!(Config::load_or_default(Some(&path)).is_err());
    }
}
