//! Observability hooks for memoized calls.
//!
//! Hooks are a best-effort side channel: the memoizer reports what happened
//! (hit, miss, store, pruning) and ignores whatever the hooks do with it. A
//! failing hook is logged and skipped; it never changes the result of the
//! call.
//!
//! - `hit`: value served from the cache
//! - `miss`: the wrapped call is about to run
//! - `stored`: fresh value persisted
//! - `pruned` / `prune_failed`: outcome of a maintenance sweep

mod builtin;

pub use builtin::{CallbackHook, LoggingHook, MemoMetrics, MetricsHook};

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheKey, MissReason, PruneReport};
use crate::{CacheError, CacheResult};

// ═══════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════

/// Kind of event, used to filter what a hook receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Hit,
    Miss,
    Stored,
    Pruned,
    PruneFailed,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::Hit => write!(f, "hit"),
            HookEvent::Miss => write!(f, "miss"),
            HookEvent::Stored => write!(f, "stored"),
            HookEvent::Pruned => write!(f, "pruned"),
            HookEvent::PruneFailed => write!(f, "prune_failed"),
        }
    }
}

/// Something that happened inside a memoized call.
#[derive(Debug)]
pub enum CacheEvent<'a> {
    /// Value served from the cache.
    Hit { key: &'a CacheKey },

    /// No usable value; the wrapped call runs next.
    Miss {
        key: &'a CacheKey,
        reason: MissReason,
    },

    /// Fresh value written to the store.
    Stored { key: &'a CacheKey, ttl: Duration },

    /// Maintenance sweep finished.
    Pruned { report: PruneReport },

    /// Maintenance sweep failed; the call itself was not affected.
    PruneFailed { error: &'a CacheError },
}

impl<'a> CacheEvent<'a> {
    /// Returns the kind of this event.
    pub fn kind(&self) -> HookEvent {
        match self {
            CacheEvent::Hit { .. } => HookEvent::Hit,
            CacheEvent::Miss { .. } => HookEvent::Miss,
            CacheEvent::Stored { .. } => HookEvent::Stored,
            CacheEvent::Pruned { .. } => HookEvent::Pruned,
            CacheEvent::PruneFailed { .. } => HookEvent::PruneFailed,
        }
    }
}

/// Human-readable one-line form, as handed to callback sinks.
impl std::fmt::Display for CacheEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheEvent::Hit { key } => write!(f, "[Hit] {}...", key.short()),
            CacheEvent::Miss { key, reason } => {
                write!(f, "[Miss] {}... ({}), running call...", key.short(), reason)
            }
            CacheEvent::Stored { key, ttl } => {
                write!(f, "[Stored] {}... for {}s", key.short(), ttl.as_secs())
            }
            CacheEvent::Pruned { report } => write!(
                f,
                "[Prune] removed {} expired entries",
                report.entries_removed
            ),
            CacheEvent::PruneFailed { error } => write!(f, "[Prune] failed: {}", error),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Hook trait
// ═══════════════════════════════════════════════════════════════════════════

/// Receiver of cache events.
pub trait Hook: Send + Sync {
    /// Hook name, used in log lines.
    fn name(&self) -> &str;

    /// Whether this hook wants events of `kind`. Defaults to all.
    fn accepts(&self, _kind: HookEvent) -> bool {
        true
    }

    /// Handles one event.
    fn on_event(&self, event: &CacheEvent<'_>) -> CacheResult<()>;
}

/// Lets callers keep a handle on a registered hook (e.g. metrics).
impl<H: Hook + ?Sized> Hook for Arc<H> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn accepts(&self, kind: HookEvent) -> bool {
        (**self).accepts(kind)
    }

    fn on_event(&self, event: &CacheEvent<'_>) -> CacheResult<()> {
        (**self).on_event(event)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Hook system
// ═══════════════════════════════════════════════════════════════════════════

/// Ordered set of hooks.
#[derive(Default)]
pub struct HookSystem {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookSystem {
    /// Creates an empty hook system.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Creates a system with the logging hook registered.
    pub fn with_defaults() -> Self {
        let mut system = Self::new();
        system.register(Box::new(LoggingHook));
        system
    }

    /// Registers a hook.
    pub fn register(&mut self, hook: Box<dyn Hook>) {
        tracing::debug!(hook_name = hook.name(), "Registering hook");
        self.hooks.push(hook);
    }

    /// Delivers `event` to every hook that accepts it.
    ///
    /// Hook errors are logged and swallowed.
    pub fn emit(&self, event: &CacheEvent<'_>) {
        let kind = event.kind();
        for hook in self.hooks.iter().filter(|h| h.accepts(kind)) {
            if let Err(e) = hook.on_event(event) {
                tracing::warn!(
                    hook_name = hook.name(),
                    event = %kind,
                    error = %e,
                    "Hook failed"
                );
            }
        }
    }

    /// Total number of registered hooks.
    pub fn count(&self) -> usize {
        self.hooks.len()
    }

    /// Number of hooks that accept `kind`.
    pub fn count_for_event(&self, kind: HookEvent) -> usize {
        self.hooks.iter().filter(|h| h.accepts(kind)).count()
    }

    /// Whether no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}
