//! Built-in hooks.
//!
//! - `LoggingHook`: writes events to `tracing`
//! - `MetricsHook`: counts hits, misses and sweeps
//! - `CallbackHook`: forwards the one-line event text to a closure

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{CacheError, CacheResult};

use super::{CacheEvent, Hook, HookEvent};

// ═══════════════════════════════════════════════════════════════════════════
// LoggingHook
// ═══════════════════════════════════════════════════════════════════════════

/// Hook that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl LoggingHook {
    /// Creates a new LoggingHook.
    pub fn new() -> Self {
        Self
    }
}

impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_event(&self, event: &CacheEvent<'_>) -> CacheResult<()> {
        match event {
            CacheEvent::Hit { key } => {
                tracing::debug!(key = %key.short(), "Cache hit");
            }
            CacheEvent::Miss { key, reason } => {
                tracing::debug!(key = %key.short(), reason = %reason, "Cache miss");
            }
            CacheEvent::Stored { key, ttl } => {
                tracing::trace!(key = %key.short(), ttl_secs = ttl.as_secs(), "Cache stored");
            }
            CacheEvent::Pruned { report } => {
                tracing::info!(
                    entries_removed = report.entries_removed,
                    blobs_removed = report.blobs_removed,
                    blob_failures = report.blob_failures,
                    "Expired entries pruned"
                );
            }
            CacheEvent::PruneFailed { error } => {
                tracing::warn!(error = %error, "Pruning sweep failed");
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MetricsHook
// ═══════════════════════════════════════════════════════════════════════════

/// Hook that counts cache activity.
///
/// Register it behind an `Arc` to read the counters afterwards.
#[derive(Debug, Default)]
pub struct MetricsHook {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    prunes: AtomicU64,
    pruned_entries: AtomicU64,
    prune_failures: AtomicU64,
}

impl MetricsHook {
    /// Creates a new MetricsHook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hits over total lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Snapshot of all counters.
    pub fn metrics(&self) -> MemoMetrics {
        MemoMetrics {
            hits: self.hits(),
            misses: self.misses(),
            stores: self.stores.load(Ordering::Relaxed),
            prunes: self.prunes.load(Ordering::Relaxed),
            pruned_entries: self.pruned_entries.load(Ordering::Relaxed),
            prune_failures: self.prune_failures.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Counters collected by `MetricsHook`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoMetrics {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub prunes: u64,
    pub pruned_entries: u64,
    pub prune_failures: u64,
    pub hit_rate: f64,
}

impl Hook for MetricsHook {
    fn name(&self) -> &str {
        "metrics"
    }

    fn on_event(&self, event: &CacheEvent<'_>) -> CacheResult<()> {
        match event {
            CacheEvent::Hit { .. } => {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            CacheEvent::Miss { .. } => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
            CacheEvent::Stored { .. } => {
                self.stores.fetch_add(1, Ordering::Relaxed);
            }
            CacheEvent::Pruned { report } => {
                self.prunes.fetch_add(1, Ordering::Relaxed);
                self.pruned_entries
                    .fetch_add(report.entries_removed as u64, Ordering::Relaxed);
            }
            CacheEvent::PruneFailed { .. } => {
                self.prune_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CallbackHook
// ═══════════════════════════════════════════════════════════════════════════

/// Hook that hands the human-readable event line to a closure.
///
/// By default only hits and misses are forwarded, which is what a plain
/// `println!` style logger usually wants.
pub struct CallbackHook {
    callback: Box<dyn Fn(&str) + Send + Sync>,
    all_events: bool,
}

impl CallbackHook {
    /// Forwards hit and miss events to `callback`.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
            all_events: false,
        }
    }

    /// Also forwards store and pruning events.
    pub fn all_events(mut self) -> Self {
        self.all_events = true;
        self
    }
}

impl std::fmt::Debug for CallbackHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHook")
            .field("all_events", &self.all_events)
            .finish_non_exhaustive()
    }
}

impl Hook for CallbackHook {
    fn name(&self) -> &str {
        "callback"
    }

    fn accepts(&self, kind: HookEvent) -> bool {
        self.all_events || matches!(kind, HookEvent::Hit | HookEvent::Miss)
    }

    /// A panicking callback is turned into a hook error.
    fn on_event(&self, event: &CacheEvent<'_>) -> CacheResult<()> {
        let line = event.to_string();
        panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(&line)))
            .map_err(|_| CacheError::other("logger callback panicked"))
    }
}
