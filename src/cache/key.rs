//! Content keys derived from call arguments.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{CacheError, CacheResult};

use super::finite::ensure_finite;

/// Length of a hex-encoded SHA-256 digest.
pub const KEY_LEN: usize = 64;

/// Arguments of a single call, in canonical form.
///
/// Positional arguments keep their order. Keyword arguments are kept
/// sorted by name, so `b=1, c=2` and `c=2, b=1` produce the same key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds arguments from a single serializable value.
    ///
    /// Tuples and arrays are spread into positional arguments, any other
    /// value becomes the only positional argument.
    ///
    /// NaN and infinite floats are rejected with `CacheError::NonFiniteFloat`.
    pub fn from_positional<T: Serialize + ?Sized>(args: &T) -> CacheResult<Self> {
        let positional = match to_arg_value(args)? {
            Value::Array(items) => items,
            other => vec![other],
        };
        Ok(Self {
            positional,
            keyword: BTreeMap::new(),
        })
    }

    /// Appends a positional argument.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> CacheResult<Self> {
        self.positional.push(to_arg_value(value)?);
        Ok(self)
    }

    /// Sets a keyword argument. A repeated name replaces the earlier value.
    pub fn kwarg<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> CacheResult<Self> {
        self.keyword
            .insert(name.to_string(), to_arg_value(value)?);
        Ok(self)
    }

    /// Positional arguments.
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Keyword arguments, sorted by name.
    pub fn keyword(&self) -> &BTreeMap<String, Value> {
        &self.keyword
    }

    /// Canonical byte representation hashed into the key.
    fn canonical_bytes(&self, namespace: Option<&str>) -> CacheResult<Vec<u8>> {
        let positional: Vec<Value> = self.positional.iter().cloned().map(canonicalize).collect();
        let keyword: BTreeMap<&str, Value> = self
            .keyword
            .iter()
            .map(|(name, value)| (name.as_str(), canonicalize(value.clone())))
            .collect();

        Ok(serde_json::to_vec(&(namespace, positional, keyword))?)
    }
}

/// JSON form of one argument. Non-finite floats would turn into `null`.
fn to_arg_value<T: Serialize + ?Sized>(value: &T) -> CacheResult<Value> {
    ensure_finite(value)?;
    Ok(serde_json::to_value(value)?)
}

/// Rebuilds every object with its fields in sorted order.
///
/// `serde_json::Map` is already sorted unless `preserve_order` is enabled
/// somewhere in the dependency graph; this keeps keys stable either way.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(fields) => {
            let mut entries: Vec<(String, Value)> = fields.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        other => other,
    }
}

/// SHA-256 content key, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a call.
    ///
    /// The optional namespace separates wrapped calls that share a cache
    /// directory but would otherwise receive identical arguments.
    pub fn derive(namespace: Option<&str>, args: &CallArgs) -> CacheResult<Self> {
        let payload = args.canonical_bytes(namespace)?;

        let mut hasher = Sha256::new();
        hasher.update(&payload);

        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Parses a key supplied from outside (CLI, management tooling).
    pub fn parse(raw: &str) -> CacheResult<Self> {
        let raw = raw.trim();
        let valid = raw.len() == KEY_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(CacheError::InvalidKey(raw.to_string()))
        }
    }

    /// Key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
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
