//! Error types for memocache.

use thiserror::Error;

/// Default result type for memocache.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the cache.
///
/// Stale, missing or unreadable entries are not errors: the store treats
/// them as misses and heals itself. Everything here means the cache could
/// not do its job and the caller has to decide what to do.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Could not serialize value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Cannot cache non-finite float {0}")]
    NonFiniteFloat(f64),

    #[error("Invalid cache key '{0}'")]
    InvalidKey(String),

    #[error("Configuration not found at: {0}")]
    ConfigNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl CacheError {
    /// Creates a generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
