//! Memoizing call wrapper.
//!
//! A `Memoizer` derives a content key from the call arguments, serves the
//! value from the `CacheStore` when it is still fresh and otherwise runs the
//! call and stores its result. A `PrunePolicy` occasionally sweeps expired
//! entries on the way.

mod memoizer;
mod policy;

pub use memoizer::{Memoized, Memoizer};
pub use policy::{PrunePolicy, DEFAULT_PRUNE_PROBABILITY};
