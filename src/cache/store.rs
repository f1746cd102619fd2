//! Disk store: SQLite index plus one JSON blob per entry.
//!
//! The index (`cache_index`) is authoritative. A blob without an index row
//! is garbage and never read; an index row whose blob is missing or
//! unreadable is removed the next time it is looked up.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finite::ensure_finite;
use crate::types::config::DEFAULT_DB_FILE_NAME;
use crate::{CacheError, CacheResult};

/// Extension of blob files.
pub const BLOB_EXTENSION: &str = "json";

/// Maximum accepted key length.
const MAX_KEY_LEN: usize = 128;

/// How long a connection waits for the single writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_index (
        key TEXT PRIMARY KEY,
        blob_ref TEXT NOT NULL,
        expires_at REAL NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache_index(expires_at);
"#;

/// Index record for one cached value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub blob_ref: String,
    /// Seconds since the Unix epoch.
    pub expires_at: f64,
}

impl CacheEntry {
    /// Whether the entry is stale at `now` (seconds since the epoch).
    pub fn is_expired_at(&self, now: f64) -> bool {
        now > self.expires_at
    }

    /// Expiration as a UTC timestamp.
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        let secs = self.expires_at.trunc() as i64;
        let nanos = (self.expires_at.fract() * 1e9) as u32;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Why a lookup did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No index row for the key.
    Absent,
    /// The row existed but its TTL had elapsed; it was removed.
    Expired,
    /// The blob was missing or could not be decoded; the entry was removed.
    Unreadable,
}

impl std::fmt::Display for MissReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissReason::Absent => write!(f, "absent"),
            MissReason::Expired => write!(f, "expired"),
            MissReason::Unreadable => write!(f, "unreadable"),
        }
    }
}

/// Outcome of a lookup.
///
/// A cached value is always wrapped in `Hit`, so a cached "empty" value
/// (`None`, `()`, `""`) never looks like a miss.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Hit(T),
    Miss(MissReason),
}

impl<T> Lookup<T> {
    /// Returns `true` for a hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// Converts into an `Option`, dropping the miss reason.
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss(_) => None,
        }
    }
}

/// Result of a pruning sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Index rows removed.
    pub entries_removed: usize,
    /// Blob files removed from disk.
    pub blobs_removed: usize,
    /// Blob files that could not be removed (left behind as orphans).
    pub blob_failures: usize,
}

/// Store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of index rows.
    pub entries: usize,
    /// Rows whose TTL has elapsed but that were not cleaned up yet.
    pub expired: usize,
    /// Total size of the blobs referenced by the index.
    pub blob_bytes: u64,
}

/// Blob read outcome that is not a storage failure.
enum BlobRead<T> {
    Value(T),
    Unreadable(String),
}

/// Persistent key/value store with TTL.
///
/// Every operation opens its own short-lived connection, so a handle can be
/// shared between threads (`Arc<CacheStore>`) and several processes can use
/// the same directory. SQLite in WAL mode serializes writers and lets
/// readers proceed concurrently.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    db_path: PathBuf,
}

impl CacheStore {
    /// Opens (or creates) a store in `dir` with the default index name.
    pub fn open<P: AsRef<Path>>(dir: P) -> CacheResult<Self> {
        Self::open_with(dir, DEFAULT_DB_FILE_NAME)
    }

    /// Opens (or creates) a store in `dir` using `db_file_name` as index.
    ///
    /// An index file that SQLite cannot read is a fatal error.
    pub fn open_with<P: AsRef<Path>>(dir: P, db_file_name: &str) -> CacheResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if db_file_name.is_empty() || Path::new(db_file_name).components().count() != 1 {
            return Err(CacheError::config(format!(
                "index file name must be a plain file name, got '{}'",
                db_file_name
            )));
        }

        fs::create_dir_all(&dir)?;

        let store = Self {
            db_path: dir.join(db_file_name),
            dir,
        };
        store.init_schema()?;

        tracing::debug!(
            dir = %store.dir.display(),
            index = %store.db_path.display(),
            "Cache store opened"
        );

        Ok(store)
    }

    fn init_schema(&self) -> CacheResult<()> {
        let conn = self.connect()?;

        // WAL is persisted in the database file, so it is only set here.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(journal_mode = %mode, "Index database is not in WAL mode");
        }

        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> CacheResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Path of the blob file for `blob_ref`.
    pub fn blob_path(&self, blob_ref: &str) -> PathBuf {
        self.dir.join(blob_ref)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Returns the cached value for `key`, or `None` on any kind of miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        Ok(self.lookup(key)?.into_option())
    }

    /// Looks up `key`, reporting why a miss happened.
    ///
    /// Expired entries and entries with a missing or undecodable blob are
    /// deleted on the way.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Lookup<T>> {
        self.lookup_with(key, |bytes| {
            serde_json::from_slice(&bytes).map_err(|e| e.to_string())
        })
    }

    /// Returns the raw blob bytes for `key`.
    pub fn get_raw(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.lookup_with(key, Ok)?.into_option())
    }

    fn lookup_with<T, F>(&self, key: &str, decode: F) -> CacheResult<Lookup<T>>
    where
        F: FnOnce(Vec<u8>) -> Result<T, String>,
    {
        validate_key(key)?;

        let Some(entry) = self.entry(key)? else {
            return Ok(Lookup::Miss(MissReason::Absent));
        };

        if entry.is_expired_at(now_secs()) {
            tracing::debug!(key = %key, "Cache entry expired");
            self.evict(&entry)?;
            return Ok(Lookup::Miss(MissReason::Expired));
        }

        match self.read_blob(&entry.blob_ref, decode)? {
            BlobRead::Value(value) => Ok(Lookup::Hit(value)),
            BlobRead::Unreadable(reason) => {
                tracing::warn!(key = %key, reason = %reason, "Cache blob unreadable, dropping entry");
                self.evict(&entry)?;
                Ok(Lookup::Miss(MissReason::Unreadable))
            }
        }
    }

    fn read_blob<T, F>(&self, blob_ref: &str, decode: F) -> CacheResult<BlobRead<T>>
    where
        F: FnOnce(Vec<u8>) -> Result<T, String>,
    {
        let bytes = match fs::read(self.blob_path(blob_ref)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(BlobRead::Unreadable("blob file missing".to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match decode(bytes) {
            Ok(value) => BlobRead::Value(value),
            Err(reason) => BlobRead::Unreadable(reason),
        })
    }

    /// Index row for `key`, without checking expiration or touching the blob.
    pub fn entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let conn = self.connect()?;
        let entry = conn
            .query_row(
                "SELECT key, blob_ref, expires_at FROM cache_index WHERE key = ?1",
                params![key],
                |row| {
                    Ok(CacheEntry {
                        key: row.get(0)?,
                        blob_ref: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// All index rows, soonest expiration first.
    pub fn entries(&self) -> CacheResult<Vec<CacheEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT key, blob_ref, expires_at FROM cache_index ORDER BY expires_at ASC",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(CacheEntry {
                    key: row.get(0)?,
                    blob_ref: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Counts entries and the disk space their blobs use.
    pub fn stats(&self) -> CacheResult<StoreStats> {
        let now = now_secs();
        let entries = self.entries()?;

        let expired = entries.iter().filter(|e| e.is_expired_at(now)).count();
        let blob_bytes = entries
            .iter()
            .filter_map(|e| fs::metadata(self.blob_path(&e.blob_ref)).ok())
            .map(|m| m.len())
            .sum();

        Ok(StoreStats {
            entries: entries.len(),
            expired,
            blob_bytes,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Stores `value` under `key` for `ttl`.
    ///
    /// Serialization failures are returned as `CacheError::Serialization`
    /// and nothing is written. NaN and infinite floats anywhere in `value`
    /// fail with `CacheError::NonFiniteFloat`, since JSON would store them
    /// as `null`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()> {
        ensure_finite(value)?;
        let bytes = serde_json::to_vec(value)?;
        self.set_raw(key, &bytes, ttl)
    }

    /// Stores raw bytes under `key` for `ttl`.
    ///
    /// The blob is written before the index row, so a crash in between
    /// leaves an orphaned blob rather than a row pointing at nothing.
    pub fn set_raw(&self, key: &str, bytes: &[u8], ttl: Duration) -> CacheResult<()> {
        validate_key(key)?;

        let blob_ref = blob_ref_for(key);
        self.write_blob(&blob_ref, bytes)?;

        let expires_at = now_secs() + ttl.as_secs_f64();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO cache_index (key, blob_ref, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 blob_ref = excluded.blob_ref,
                 expires_at = excluded.expires_at",
            params![key, blob_ref, expires_at],
        )?;

        tracing::trace!(key = %key, bytes = bytes.len(), expires_at, "Cache entry stored");
        Ok(())
    }

    /// Writes through a temp file and renames it into place, so readers
    /// never observe a half-written blob.
    fn write_blob(&self, blob_ref: &str, bytes: &[u8]) -> CacheResult<()> {
        let target = self.blob_path(blob_ref);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", blob_ref, Uuid::new_v4().simple()));

        let written = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Removes the entry for `key` and its blob.
    ///
    /// Returns `true` if an index row existed.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        match self.entry(key)? {
            Some(entry) => {
                self.delete_entry(&entry.key, &entry.blob_ref)?;
                Ok(true)
            }
            None => {
                // Clear a possible orphan left by an interrupted `set`.
                self.remove_blob(&blob_ref_for(key))?;
                Ok(false)
            }
        }
    }

    /// Removes the blob (a missing file is fine) and then the index row.
    pub fn delete_entry(&self, key: &str, blob_ref: &str) -> CacheResult<()> {
        self.remove_blob(blob_ref)?;
        let conn = self.connect()?;
        conn.execute("DELETE FROM cache_index WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Lazy cleanup of a stale row.
    ///
    /// Only removes the row if it still carries the expiration we looked
    /// at, so a concurrent `set` of the same key is not thrown away.
    fn evict(&self, entry: &CacheEntry) -> CacheResult<()> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM cache_index WHERE key = ?1 AND expires_at = ?2",
            params![entry.key, entry.expires_at],
        )?;
        if removed > 0 {
            self.remove_blob(&entry.blob_ref)?;
        }
        Ok(())
    }

    fn remove_blob(&self, blob_ref: &str) -> CacheResult<bool> {
        match fs::remove_file(self.blob_path(blob_ref)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every entry whose expiration is strictly before now.
    ///
    /// Rows are removed in one write transaction; blobs are unlinked after
    /// commit. A blob that cannot be unlinked is counted in
    /// `blob_failures` and left as an orphan.
    pub fn prune_expired(&self) -> CacheResult<PruneReport> {
        let now = now_secs();
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let expired: Vec<(String, String)> = {
            let mut stmt =
                tx.prepare("SELECT key, blob_ref FROM cache_index WHERE expires_at < ?1")?;
            let rows = stmt
                .query_map(params![now], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        if expired.is_empty() {
            return Ok(PruneReport::default());
        }

        let entries_removed =
            tx.execute("DELETE FROM cache_index WHERE expires_at < ?1", params![now])?;
        tx.commit()?;

        let mut report = PruneReport {
            entries_removed,
            ..PruneReport::default()
        };

        for (key, blob_ref) in &expired {
            match self.remove_blob(blob_ref) {
                Ok(true) => report.blobs_removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to remove expired blob");
                    report.blob_failures += 1;
                }
            }
        }

        tracing::debug!(
            entries_removed = report.entries_removed,
            blobs_removed = report.blobs_removed,
            "Pruned expired cache entries"
        );

        Ok(report)
    }

    /// Removes every entry. Returns the number of rows removed.
    pub fn clear(&self) -> CacheResult<usize> {
        let entries = self.entries()?;
        for entry in &entries {
            self.remove_blob(&entry.blob_ref)?;
        }

        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM cache_index", [])?;

        tracing::info!(removed, "Cache cleared");
        Ok(removed)
    }
}

/// Blob file name for a key.
pub fn blob_ref_for(key: &str) -> String {
    format!("{}.{}", key, BLOB_EXTENSION)
}

/// Keys become file names, so only a conservative alphabet is accepted.
fn validate_key(key: &str) -> CacheResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// Current time in seconds since the Unix epoch.
fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
