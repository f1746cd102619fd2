//! Persistent cache: content keys and the disk store.
//!
//! The store keeps a SQLite index (`key`, `blob_ref`, `expires_at`) next to
//! one JSON blob per entry. Keys are SHA-256 digests of the canonical call
//! arguments.

mod finite;
mod key;
mod store;

pub use key::{CacheKey, CallArgs, KEY_LEN};
pub use store::{
    blob_ref_for, CacheEntry, CacheStore, Lookup, MissReason, PruneReport, StoreStats,
    BLOB_EXTENSION,
};
