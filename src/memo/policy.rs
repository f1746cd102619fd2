//! Probabilistic maintenance policy.

use rand::Rng;

use crate::{CacheError, CacheResult};

/// Default chance that a miss triggers a pruning sweep.
pub const DEFAULT_PRUNE_PROBABILITY: f64 = 0.01;

/// Decides when a memoized call also sweeps expired entries.
///
/// Sweeping on a small fraction of misses spreads the cleanup cost over
/// many calls without a background timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrunePolicy {
    probability: f64,
}

impl PrunePolicy {
    /// Creates a policy that fires with `probability` (0.0 - 1.0).
    pub fn new(probability: f64) -> CacheResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(CacheError::config(format!(
                "prune probability must be within 0.0..=1.0, got {}",
                probability
            )));
        }
        Ok(Self { probability })
    }

    /// Never prunes inline.
    pub fn never() -> Self {
        Self { probability: 0.0 }
    }

    /// Prunes after every miss.
    pub fn always() -> Self {
        Self { probability: 1.0 }
    }

    /// Configured probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Rolls the dice with the thread-local RNG.
    pub fn should_prune(&self) -> bool {
        self.should_prune_with(&mut rand::thread_rng())
    }

    /// Rolls the dice with the given RNG.
    pub fn should_prune_with<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.probability)
    }
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            probability: DEFAULT_PRUNE_PROBABILITY,
        }
    }
}
