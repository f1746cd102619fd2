//! Configuration for memocache.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::memo::DEFAULT_PRUNE_PROBABILITY;
use crate::{CacheError, CacheResult};

/// Default file name of the index database inside the cache directory.
pub const DEFAULT_DB_FILE_NAME: &str = "metadata.db";

/// Main configuration for memocache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Persistent cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Storage root holding the index and the blob files.
    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,

    /// Index database file name, relative to `directory`.
    #[serde(default = "default_db_file_name")]
    pub db_file_name: String,

    /// Entry time to live in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Chance (0.0 - 1.0) that a miss triggers a pruning sweep.
    #[serde(default = "default_prune_probability")]
    pub prune_probability: f64,

    /// Optional namespace mixed into every derived key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl CacheConfig {
    /// Creates a configuration for the given directory with default values.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Sets the TTL in seconds.
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Overrides the index file name.
    pub fn with_db_file_name<S: Into<String>>(mut self, name: S) -> Self {
        self.db_file_name = name.into();
        self
    }

    /// Sets the pruning probability.
    pub fn with_prune_probability(mut self, probability: f64) -> Self {
        self.prune_probability = probability;
        self
    }

    /// Sets the key namespace.
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Full path of the index database.
    pub fn db_path(&self) -> PathBuf {
        self.directory.join(&self.db_file_name)
    }

    /// Makes a relative `directory` relative to `base` (the folder holding
    /// the configuration file) instead of the working directory.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        if self.directory.is_relative() {
            self.directory = base.join(&self.directory);
        }
    }

    /// Checks values that cannot be expressed in the type system.
    pub fn validate(&self) -> CacheResult<()> {
        if self.ttl_secs == 0 {
            return Err(CacheError::config("cache.ttl_secs must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.prune_probability) {
            return Err(CacheError::config(format!(
                "cache.prune_probability must be within 0.0..=1.0, got {}",
                self.prune_probability
            )));
        }
        let name = Path::new(&self.db_file_name);
        if self.db_file_name.is_empty() || name.components().count() != 1 {
            return Err(CacheError::config(format!(
                "cache.db_file_name must be a plain file name, got '{}'",
                self.db_file_name
            )));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            db_file_name: default_db_file_name(),
            ttl_secs: default_ttl(),
            prune_probability: default_prune_probability(),
            namespace: None,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("memocache"))
        .unwrap_or_else(|| PathBuf::from(".memocache"))
}

fn default_db_file_name() -> String {
    DEFAULT_DB_FILE_NAME.to_string()
}

fn default_ttl() -> u64 {
    604_800 // 1 week
}

fn default_prune_probability() -> f64 {
    DEFAULT_PRUNE_PROBABILITY
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CacheError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.cache.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CacheResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Creates default configuration.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Tries to load configuration from current directory or uses default.
    pub fn load_or_default() -> Self {
        Self::load("memocache.toml").unwrap_or_else(|_| Self::default_config())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.db_file_name, "metadata.db");
        assert_eq!(config.ttl_secs, 604_800);
        assert!((config.prune_probability - 0.01).abs() < f64::EPSILON);
        assert!(config.namespace.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(CacheConfig::new("/tmp/x").with_ttl_secs(0).validate().is_err());
        assert!(CacheConfig::new("/tmp/x")
            .with_prune_probability(1.5)
            .validate()
            .is_err());
        assert!(CacheConfig::new("/tmp/x")
            .with_db_file_name("nested/index.db")
            .validate()
            .is_err());
        assert!(CacheConfig::new("/tmp/x")
            .with_db_file_name("")
            .validate()
            .is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("memocache.toml");

        let mut config = Config::default_config();
        config.cache = CacheConfig::new(temp.path().join("cache"))
            .with_ttl_secs(60)
            .with_namespace("prayer-times");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.cache.ttl_secs, 60);
        assert_eq!(loaded.cache.namespace.as_deref(), Some("prayer-times"));
        assert_eq!(loaded.cache.directory, temp.path().join("cache"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("memocache.toml");
        std::fs::write(&path, "[cache]\nttl_secs = 10\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.cache.ttl_secs, 10);
        assert_eq!(loaded.cache.db_file_name, "metadata.db");
        assert_eq!(loaded.general.log_level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here/memocache.toml").unwrap_err();
        assert!(matches!(err, CacheError::ConfigNotFound(_)));
    }

    #[test]
    fn test_relative_directory_resolves_against_base() {
        let mut relative = CacheConfig::new(".memocache");
        relative.resolve_relative_to(Path::new("/srv/project"));
        assert_eq!(relative.directory, PathBuf::from("/srv/project/.memocache"));

        let mut absolute = CacheConfig::new("/var/cache/app");
        absolute.resolve_relative_to(Path::new("/srv/project"));
        assert_eq!(absolute.directory, PathBuf::from("/var/cache/app"));
    }

    #[test]
    fn test_db_path() {
        let config = CacheConfig::new("/var/cache/app").with_db_file_name("index.sqlite");
        assert_eq!(config.db_path(), PathBuf::from("/var/cache/app/index.sqlite"));
        assert_eq!(config.ttl(), Duration::from_secs(config.ttl_secs));
    }
}
