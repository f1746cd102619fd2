//! Compute-or-fetch wrapper around the disk store.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheKey, CacheStore, CallArgs, Lookup, PruneReport};
use crate::hooks::{CacheEvent, CallbackHook, Hook, HookSystem};
use crate::types::config::CacheConfig;
use crate::{CacheError, CacheResult};

use super::policy::PrunePolicy;

/// Memoizes calls into a `CacheStore`.
///
/// A memoizer is an explicit handle: several memoizers with different TTLs,
/// namespaces or directories can live side by side. Hits never run the
/// wrapped call. Two threads missing the same key at the same time will both
/// run it and the last write wins.
#[derive(Debug)]
pub struct Memoizer {
    store: Arc<CacheStore>,
    ttl: Duration,
    policy: PrunePolicy,
    hooks: HookSystem,
    namespace: Option<String>,
}

impl Memoizer {
    /// Creates a memoizer with the default prune policy.
    ///
    /// The logging hook is registered from the start, so hits, misses and
    /// sweeps show up in `tracing` output.
    pub fn new(store: Arc<CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            policy: PrunePolicy::default(),
            hooks: HookSystem::with_defaults(),
            namespace: None,
        }
    }

    /// Opens the store described by `config` and builds a memoizer on it.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        config.validate()?;

        let store = CacheStore::open_with(&config.directory, &config.db_file_name)?;
        let mut memo = Self::new(Arc::new(store), config.ttl())
            .with_policy(PrunePolicy::new(config.prune_probability)?);
        memo.namespace = config.namespace.clone();

        Ok(memo)
    }

    /// Sets the maintenance policy.
    pub fn with_policy(mut self, policy: PrunePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Mixes `namespace` into every key derived by this memoizer.
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Registers an observability hook.
    pub fn with_hook<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.hooks.register(Box::new(hook));
        self
    }

    /// Registers a callback receiving one human-readable line per hit or miss.
    pub fn with_logger<F>(self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.with_hook(CallbackHook::new(callback))
    }

    /// Underlying store, for administrative access.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// TTL applied to new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Maintenance policy.
    pub fn policy(&self) -> PrunePolicy {
        self.policy
    }

    /// Key namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Key under which a call with `args` is cached.
    pub fn key_for(&self, args: &CallArgs) -> CacheResult<CacheKey> {
        CacheKey::derive(self.namespace(), args)
    }

    /// Returns the cached value for `args` or computes and stores it.
    pub fn get_or_compute<T, F>(&self, args: &CallArgs, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.try_get_or_compute(args, || Ok::<T, CacheError>(compute()))
    }

    /// Like `get_or_compute` for fallible calls.
    ///
    /// An `Err` from `compute` is returned as is and nothing is cached.
    pub fn try_get_or_compute<T, E, F>(&self, args: &CallArgs, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Result<T, E>,
    {
        let key = self.key_for(args)?;

        match self.store.lookup::<T>(key.as_str())? {
            Lookup::Hit(value) => {
                self.hooks.emit(&CacheEvent::Hit { key: &key });
                return Ok(value);
            }
            Lookup::Miss(reason) => {
                self.hooks.emit(&CacheEvent::Miss { key: &key, reason });
            }
        }

        let value = compute()?;

        self.store.set(key.as_str(), &value, self.ttl)?;
        self.hooks.emit(&CacheEvent::Stored {
            key: &key,
            ttl: self.ttl,
        });

        if self.policy.should_prune() {
            self.run_maintenance();
        }

        Ok(value)
    }

    /// Drops the cached value for `args`. Returns `true` if one existed.
    pub fn invalidate(&self, args: &CallArgs) -> CacheResult<bool> {
        let key = self.key_for(args)?;
        self.store.delete(key.as_str())
    }

    /// Runs a pruning sweep now, returning its errors to the caller.
    pub fn prune_now(&self) -> CacheResult<PruneReport> {
        let report = self.store.prune_expired()?;
        self.hooks.emit(&CacheEvent::Pruned { report });
        Ok(report)
    }

    /// Best-effort sweep: failures are reported to hooks only (the logging
    /// hook turns them into a warning).
    fn run_maintenance(&self) {
        match self.store.prune_expired() {
            Ok(report) => self.hooks.emit(&CacheEvent::Pruned { report }),
            Err(error) => self.hooks.emit(&CacheEvent::PruneFailed { error: &error }),
        }
    }

    /// Wraps `func` so that calls go through this memoizer.
    pub fn wrap<F>(self, func: F) -> Memoized<F> {
        Memoized { memo: self, func }
    }
}

/// A function bundled with its memoizer.
///
/// The argument value is the cache key input: tuples are spread into
/// positional arguments, anything else is a single positional argument.
pub struct Memoized<F> {
    memo: Memoizer,
    func: F,
}

impl<F> Memoized<F> {
    /// Calls the function, or returns the cached result for `args`.
    pub fn call<A, T>(&self, args: A) -> CacheResult<T>
    where
        F: Fn(A) -> T,
        A: Serialize,
        T: Serialize + DeserializeOwned,
    {
        let call_args = CallArgs::from_positional(&args)?;
        self.memo.get_or_compute(&call_args, || (self.func)(args))
    }

    /// Calls a fallible function; errors are passed through and not cached.
    pub fn try_call<A, T, E>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Result<T, E>,
        A: Serialize,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        let call_args = CallArgs::from_positional(&args)?;
        self.memo.try_get_or_compute(&call_args, || (self.func)(args))
    }

    /// The memoizer behind this function.
    pub fn memoizer(&self) -> &Memoizer {
        &self.memo
    }
}

impl<F> std::fmt::Debug for Memoized<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoized")
            .field("memo", &self.memo)
            .finish_non_exhaustive()
    }
}
