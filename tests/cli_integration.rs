//! End-to-end tests of the `memocache` binary.

use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use memocache::{CacheKey, CacheStore, CallArgs};

fn memocache(work_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("memocache").expect("binary is built");
    cmd.current_dir(work_dir.path());
    cmd
}

fn masjid_key() -> CacheKey {
    let args = CallArgs::from_positional(&"http://masjid-1.com").unwrap();
    CacheKey::derive(None, &args).unwrap()
}

fn seeded_cache() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("cache");
    let store = CacheStore::open(&cache_dir).unwrap();
    store
        .set(
            masjid_key().as_str(),
            &serde_json::json!({"name": "Central Masjid"}),
            Duration::from_secs(3600),
        )
        .unwrap();
    (temp_dir, cache_dir.display().to_string())
}

#[test]
fn test_version() {
    let temp_dir = TempDir::new().unwrap();
    memocache(&temp_dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("memocache v"));
}

#[test]
fn test_help_lists_commands() {
    let temp_dir = TempDir::new().unwrap();
    memocache(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("prune"))
        .stdout(predicate::str::contains("stats"));
}

#[test]
fn test_init_writes_config_and_gitignore() {
    let temp_dir = TempDir::new().unwrap();
    memocache(&temp_dir)
        .args(["init", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized"));

    assert!(temp_dir.path().join("memocache.toml").exists());
    assert!(temp_dir.path().join(".memocache/metadata.db").exists());
    let gitignore = std::fs::read_to_string(temp_dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".memocache/"));
}

#[test]
fn test_stats_counts_entries() {
    let (temp_dir, cache_dir) = seeded_cache();
    memocache(&temp_dir)
        .args(["--dir", cache_dir.as_str(), "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:         1"));
}

#[test]
fn test_get_prints_value_then_miss_after_delete() {
    let (temp_dir, cache_dir) = seeded_cache();
    let key = masjid_key();

    memocache(&temp_dir)
        .args(["--dir", cache_dir.as_str(), "get", key.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Central Masjid"));

    memocache(&temp_dir)
        .args(["--dir", cache_dir.as_str(), "delete", key.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Deleted {}", key)));

    memocache(&temp_dir)
        .args(["--dir", cache_dir.as_str(), "get", key.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Miss (absent)"));
}

#[test]
fn test_prune_reports_removed_entries() {
    let (temp_dir, cache_dir) = seeded_cache();
    let store = CacheStore::open(&cache_dir).unwrap();
    store.set("stale", &1, Duration::from_millis(10)).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    memocache(&temp_dir)
        .args(["--dir", cache_dir.as_str(), "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pruned 1 expired entries"));

    assert!(store.entry("stale").unwrap().is_none());
    assert!(store.entry(masjid_key().as_str()).unwrap().is_some());
}

#[test]
fn test_clear_requires_confirmation() {
    let (temp_dir, cache_dir) = seeded_cache();

    memocache(&temp_dir)
        .args(["--dir", cache_dir.as_str(), "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));

    memocache(&temp_dir)
        .args(["--dir", cache_dir.as_str(), "clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 entries"));
}

#[test]
fn test_invalid_key_is_rejected() {
    let (temp_dir, cache_dir) = seeded_cache();
    for raw in ["../escape", "masjid_1"] {
        memocache(&temp_dir)
            .args(["--dir", cache_dir.as_str(), "get", raw])
            .assert()
            .failure()
            .stderr(predicate::str::contains("InvalidKey"));
    }
}

#[test]
fn test_relative_directory_follows_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    memocache(&temp_dir)
        .args(["init", "--path"])
        .arg(&project)
        .assert()
        .success();

    let store = CacheStore::open(project.join(".memocache")).unwrap();
    store.set(masjid_key().as_str(), &1, Duration::from_secs(3600)).unwrap();

    memocache(&temp_dir)
        .arg("--config")
        .arg(project.join("memocache.toml"))
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:         1"));
    assert!(!temp_dir.path().join(".memocache").exists());
}
