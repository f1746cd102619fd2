//! # memocache
//!
//! Persistent TTL memoization. Results of expensive, deterministic calls
//! (network scrapes, slow queries) are written to a local directory and
//! served from there until they expire, across process restarts.
//!
//! ## Modules
//!
//! - [`cache`] - Content keys and the disk store (SQLite index + JSON blobs)
//! - [`memo`] - Compute-or-fetch wrapper and its maintenance policy
//! - [`hooks`] - Observability hooks (logging, metrics, callbacks)
//! - [`cli`] - Management command line (feature `cli`)
//! - [`types`] - Configuration and errors
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use memocache::{CacheStore, Memoizer};
//!
//! # fn main() -> memocache::CacheResult<()> {
//! let store = Arc::new(CacheStore::open("data/cache")?);
//! let double = Memoizer::new(store, Duration::from_secs(3600))
//!     .with_logger(|line| println!("{line}"))
//!     .wrap(|x: i64| x * 2);
//!
//! assert_eq!(double.call(5)?, 10);
//! assert_eq!(double.call(5)?, 10); // served from disk
//! # Ok(())
//! # }
//! ```

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod hooks;
pub mod memo;
pub mod types;

pub use cache::{CacheKey, CacheStore, CallArgs, Lookup, MissReason};
pub use memo::{Memoized, Memoizer, PrunePolicy};
pub use types::config::{CacheConfig, Config};
pub use types::errors::{CacheError, CacheResult};
