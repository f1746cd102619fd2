//! Implementation of the memocache CLI commands.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::cache::{CacheEntry, CacheKey, CacheStore, Lookup, BLOB_EXTENSION};
use crate::types::config::{CacheConfig, Config};
use crate::{CacheError, CacheResult};

/// Directory created by `init`, relative to the project.
const LOCAL_CACHE_DIR: &str = ".memocache";

fn open_store(config: &CacheConfig) -> CacheResult<CacheStore> {
    CacheStore::open_with(&config.directory, &config.db_file_name)
}

/// Initializes configuration in the specified directory.
pub fn init(path: Option<PathBuf>) -> CacheResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!("Directory created: {}", target_dir.display());
    }

    let config_path = target_dir.join("memocache.toml");

    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use 'memocache config' to view it.");
        return Ok(());
    }

    let cache_dir = target_dir.join(LOCAL_CACHE_DIR);
    let store = CacheStore::open(&cache_dir)?;
    tracing::info!("{} directory created", LOCAL_CACHE_DIR);

    update_gitignore(&target_dir)?;

    let mut config = Config::default_config();
    config.cache.directory = PathBuf::from(LOCAL_CACHE_DIR);
    config.save(&config_path)?;

    println!("memocache initialized successfully!");
    println!("Configuration created at: {}", config_path.display());
    println!("Cache directory: {}", store.dir().display());

    Ok(())
}

/// Updates or creates .gitignore to include the cache directory.
fn update_gitignore(target_dir: &Path) -> CacheResult<()> {
    let gitignore_path = target_dir.join(".gitignore");
    let entry = format!("{}/", LOCAL_CACHE_DIR);
    let comment = "# memocache - persistent call cache";

    if gitignore_path.exists() {
        let content = std::fs::read_to_string(&gitignore_path)?;

        if content
            .lines()
            .any(|line| line.trim() == entry || line.trim() == LOCAL_CACHE_DIR)
        {
            tracing::debug!(".gitignore already contains {}", entry);
            return Ok(());
        }

        let mut new_content = content.trim_end().to_string();
        if !new_content.is_empty() {
            new_content.push_str("\n\n");
        }
        new_content.push_str(comment);
        new_content.push('\n');
        new_content.push_str(&entry);
        new_content.push('\n');

        std::fs::write(&gitignore_path, new_content)?;
        println!(".gitignore updated with {}", entry);
    } else {
        std::fs::write(&gitignore_path, format!("{}\n{}\n", comment, entry))?;
        println!(".gitignore created with {}", entry);
    }

    Ok(())
}

/// Shows entry counts and disk usage.
pub fn stats(config: &CacheConfig) -> CacheResult<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;

    println!("Cache directory: {}", store.dir().display());
    println!("Index:           {}", store.db_path().display());
    println!("Entries:         {}", stats.entries);
    println!("Expired:         {}", stats.expired);
    println!("Blob size:       {}", format_bytes(stats.blob_bytes));

    if stats.expired > 0 {
        println!();
        println!("Run 'memocache prune' to remove expired entries.");
    }

    Ok(())
}

/// Lists entries, soonest expiration first.
pub fn list(limit: usize, config: &CacheConfig) -> CacheResult<()> {
    let store = open_store(config)?;
    let entries = store.entries()?;

    if entries.is_empty() {
        println!("Cache is empty.");
        return Ok(());
    }

    println!("{:<66} {:<26} REMAINING", "KEY", "EXPIRES AT (UTC)");
    for entry in entries.iter().take(limit) {
        println!(
            "{:<66} {:<26} {}",
            entry.key,
            entry.expires_at_utc().format("%Y-%m-%d %H:%M:%S"),
            format_remaining(entry)
        );
    }

    if entries.len() > limit {
        println!("... and {} more", entries.len() - limit);
    }

    Ok(())
}

/// Shows the index record of a key.
///
/// Keys given on the command line must be derived keys (64 hex characters).
pub fn inspect(key: &str, config: &CacheConfig) -> CacheResult<()> {
    let key = CacheKey::parse(key)?;
    let store = open_store(config)?;

    let Some(entry) = store.entry(key.as_str())? else {
        println!("No entry for key {}", key);
        return Ok(());
    };

    let blob_path = store.blob_path(&entry.blob_ref);
    let blob_size = std::fs::metadata(&blob_path).map(|m| m.len()).ok();

    println!("Key:        {}", entry.key);
    println!("Blob:       {}", blob_path.display());
    match blob_size {
        Some(size) => println!("Blob size:  {}", format_bytes(size)),
        None => println!("Blob size:  missing"),
    }
    println!("Expires at: {}", entry.expires_at_utc().to_rfc3339());
    println!("Remaining:  {}", format_remaining(&entry));

    Ok(())
}

/// Prints the cached value of a key.
pub fn get(key: &str, config: &CacheConfig) -> CacheResult<()> {
    let key = CacheKey::parse(key)?;
    let store = open_store(config)?;

    match store.lookup::<serde_json::Value>(key.as_str())? {
        Lookup::Hit(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Lookup::Miss(reason) => {
            println!("Miss ({})", reason);
        }
    }

    Ok(())
}

/// Deletes a key.
pub fn delete(key: &str, config: &CacheConfig) -> CacheResult<()> {
    let key = CacheKey::parse(key)?;
    let store = open_store(config)?;

    if store.delete(key.as_str())? {
        println!("Deleted {}", key);
    } else {
        println!("No entry for key {}", key);
    }

    Ok(())
}

/// Removes every expired entry.
pub fn prune(config: &CacheConfig) -> CacheResult<()> {
    let store = open_store(config)?;
    let report = store.prune_expired()?;

    println!(
        "Pruned {} expired entries ({} blobs removed)",
        report.entries_removed, report.blobs_removed
    );
    if report.blob_failures > 0 {
        println!(
            "Warning: {} blobs could not be removed and were left behind",
            report.blob_failures
        );
    }

    Ok(())
}

/// Removes every entry.
pub fn clear(yes: bool, config: &CacheConfig) -> CacheResult<()> {
    if !yes {
        return Err(CacheError::other(
            "refusing to clear the cache without --yes",
        ));
    }

    let store = open_store(config)?;
    let removed = store.clear()?;
    println!("Removed {} entries", removed);

    Ok(())
}

/// Checks the directory for dangling rows and orphaned blobs.
pub fn doctor(config: &CacheConfig) -> CacheResult<()> {
    println!("Checking cache at {}...\n", config.directory.display());

    let mut issues: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if let Err(e) = config.validate() {
        issues.push(e.to_string());
    } else {
        println!("✓ Configuration valid");
    }

    let store = match open_store(config) {
        Ok(store) => {
            println!("✓ Index opened ({})", store.db_path().display());
            store
        }
        Err(e) => {
            println!("✗ Index could not be opened: {}", e);
            return Err(e);
        }
    };

    let entries = store.entries()?;
    let referenced: HashSet<&str> = entries.iter().map(|e| e.blob_ref.as_str()).collect();

    let dangling = entries
        .iter()
        .filter(|e| !store.blob_path(&e.blob_ref).exists())
        .count();
    if dangling > 0 {
        warnings.push(format!(
            "{} index rows point at missing blobs (they are dropped on next lookup)",
            dangling
        ));
    }

    let mut orphans = 0;
    let mut temp_files = 0;
    for dir_entry in std::fs::read_dir(store.dir())? {
        let name = dir_entry?.file_name().to_string_lossy().into_owned();
        if name.ends_with(".tmp") {
            temp_files += 1;
        } else if name.ends_with(&format!(".{}", BLOB_EXTENSION))
            && !referenced.contains(name.as_str())
        {
            orphans += 1;
        }
    }
    if orphans > 0 {
        warnings.push(format!("{} blob files have no index row", orphans));
    }
    if temp_files > 0 {
        warnings.push(format!(
            "{} temporary files left by interrupted writes",
            temp_files
        ));
    }

    let expired = store.stats()?.expired;
    if expired > 0 {
        warnings.push(format!("{} expired entries waiting for a prune", expired));
    }

    println!();
    if issues.is_empty() && warnings.is_empty() {
        println!("✓ All good! {} entries.", entries.len());
    } else {
        if !warnings.is_empty() {
            println!("Warnings:");
            for warning in &warnings {
                println!("  ⚠ {}", warning);
            }
        }
        if !issues.is_empty() {
            println!("Problems:");
            for issue in &issues {
                println!("  ✗ {}", issue);
            }
        }
    }

    Ok(())
}

/// Prints the effective configuration.
pub fn config_cmd(config: &Config, config_path: &Path) -> CacheResult<()> {
    if config_path.exists() {
        println!("# Loaded from {}", config_path.display());
    } else {
        println!("# {} not found, showing defaults", config_path.display());
    }
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Shows version.
pub fn version() {
    println!("memocache v{}", env!("CARGO_PKG_VERSION"));
    println!("Persistent TTL memoization on local disk");
}

fn format_remaining(entry: &CacheEntry) -> String {
    let remaining = entry
        .expires_at_utc()
        .signed_duration_since(Utc::now())
        .num_seconds();
    if remaining < 0 {
        "expired".to_string()
    } else {
        format_secs(remaining as u64)
    }
}

fn format_secs(secs: u64) -> String {
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3_600, (secs % 3_600) / 60);
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f >= KIB * KIB {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    } else if bytes_f >= KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{} B", bytes)
    }
}
