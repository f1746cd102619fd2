//! Integration tests for memoized calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use memocache::hooks::MetricsHook;
use memocache::{CacheConfig, CacheStore, CallArgs, Memoizer, PrunePolicy};

fn temp_memoizer(ttl: Duration) -> (TempDir, Memoizer) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = CacheStore::open(temp_dir.path()).expect("Failed to open store");
    let memo = Memoizer::new(Arc::new(store), ttl).with_policy(PrunePolicy::never());
    (temp_dir, memo)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MasjidConfig {
    name: String,
    capacity: u32,
}

mod hits_and_misses {
    use super::*;

    #[test]
    fn test_double_runs_once() {
        let (_temp_dir, memo) = temp_memoizer(Duration::from_secs(3600));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let double = memo.wrap(move |x: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            x * 2
        });

        assert_eq!(double.call(5).unwrap(), 10);
        assert_eq!(double.call(5).unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_masjid_config_fetched_once_per_url() {
        let (_temp_dir, memo) = temp_memoizer(Duration::from_secs(604_800));
        let fetched = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = Arc::clone(&fetched);

        let get_masjid_config = memo.wrap(move |url: String| {
            log.lock().unwrap().push(url);
            MasjidConfig {
                name: "Central Masjid".to_string(),
                capacity: 500,
            }
        });

        let first = get_masjid_config.call("http://masjid-1.com".to_string()).unwrap();
        let second = get_masjid_config.call("http://masjid-1.com".to_string()).unwrap();
        let third = get_masjid_config.call("http://masjid-2.com".to_string()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(
            *fetched.lock().unwrap(),
            vec!["http://masjid-1.com".to_string(), "http://masjid-2.com".to_string()]
        );
        assert_eq!(get_masjid_config.memoizer().store().entries().unwrap().len(), 2);
    }

    #[test]
    fn test_keyword_order_hits_same_entry() {
        let (_temp_dir, memo) = temp_memoizer(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first = CallArgs::new()
            .arg("a")
            .unwrap()
            .kwarg("b", &1)
            .unwrap()
            .kwarg("c", &2)
            .unwrap();
        let second = CallArgs::new()
            .arg("a")
            .unwrap()
            .kwarg("c", &2)
            .unwrap()
            .kwarg("b", &1)
            .unwrap();

        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            "value".to_string()
        };

        memo.get_or_compute(&first, compute).unwrap();
        memo.get_or_compute(&second, compute).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.key_for(&first).unwrap(), memo.key_for(&second).unwrap());
    }

    #[test]
    fn test_different_args_are_independent() {
        let (_temp_dir, memo) = temp_memoizer(Duration::from_secs(60));

        let one = CallArgs::from_positional(&(1, "x")).unwrap();
        let two = CallArgs::from_positional(&(2, "x")).unwrap();

        assert_ne!(memo.key_for(&one).unwrap(), memo.key_for(&two).unwrap());
        assert_eq!(memo.get_or_compute(&one, || 1).unwrap(), 1);
        assert_eq!(memo.get_or_compute(&two, || 2).unwrap(), 2);
        assert_eq!(memo.store().entries().unwrap().len(), 2);
    }
}

mod expiration {
    use super::*;

    #[test]
    fn test_reruns_after_ttl_and_refreshes_expiration() {
        let (_temp_dir, memo) = temp_memoizer(Duration::from_millis(200));
        let calls = AtomicUsize::new(0);
        let args = CallArgs::from_positional(&"slow").unwrap();
        let key = memo.key_for(&args).unwrap();

        let compute = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        assert_eq!(memo.get_or_compute(&args, compute).unwrap(), 1);
        let first_expiry = memo.store().entry(key.as_str()).unwrap().unwrap().expires_at;

        thread::sleep(Duration::from_millis(350));

        assert_eq!(memo.get_or_compute(&args, compute).unwrap(), 2);
        let second_expiry = memo.store().entry(key.as_str()).unwrap().unwrap().expires_at;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(second_expiry > first_expiry);
    }

    #[test]
    fn test_deleted_blob_is_recomputed_and_repaired() {
        let (_temp_dir, memo) = temp_memoizer(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let args = CallArgs::from_positional(&42).unwrap();
        let key = memo.key_for(&args).unwrap();

        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            "answer".to_string()
        };

        memo.get_or_compute(&args, compute).unwrap();
        let blob = memo
            .store()
            .blob_path(&memocache::cache::blob_ref_for(key.as_str()));
        std::fs::remove_file(&blob).unwrap();

        assert_eq!(memo.get_or_compute(&args, compute).unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(blob.exists());

        memo.get_or_compute(&args, compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

mod maintenance {
    use super::*;

    #[test]
    fn test_prune_now_reports_to_hooks() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(temp_dir.path()).unwrap());
        let metrics = Arc::new(MetricsHook::new());

        store.set("stale", &1, Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(50));

        let memo = Memoizer::new(Arc::clone(&store), Duration::from_secs(60))
            .with_policy(PrunePolicy::never())
            .with_hook(Arc::clone(&metrics));

        let report = memo.prune_now().unwrap();
        assert_eq!(report.entries_removed, 1);
        assert_eq!(metrics.metrics().pruned_entries, 1);
    }

    #[test]
    fn test_never_policy_leaves_expired_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(temp_dir.path()).unwrap());
        store.set("stale", &1, Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(50));

        let memo = Memoizer::new(Arc::clone(&store), Duration::from_secs(60))
            .with_policy(PrunePolicy::never());
        for i in 0..20 {
            memo.get_or_compute(&CallArgs::from_positional(&i).unwrap(), || i)
                .unwrap();
        }

        assert!(store.entry("stale").unwrap().is_some());
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_memoizers_from_config_share_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let base = CacheConfig::new(temp_dir.path().join("data/cache"))
            .with_ttl_secs(3600)
            .with_prune_probability(0.0);

        let configs = Memoizer::from_config(&base.clone().with_namespace("config")).unwrap();
        let calendars = Memoizer::from_config(&base.with_namespace("calendar")).unwrap();

        let args = CallArgs::from_positional(&2026).unwrap();
        assert_eq!(configs.get_or_compute(&args, || "config".to_string()).unwrap(), "config");
        assert_eq!(
            calendars.get_or_compute(&args, || "calendar".to_string()).unwrap(),
            "calendar"
        );
        assert_eq!(configs.store().entries().unwrap().len(), 2);
    }

    #[test]
    fn test_cache_survives_new_memoizer() {
        let temp_dir = TempDir::new().unwrap();
        let config = CacheConfig::new(temp_dir.path()).with_ttl_secs(60);
        let args = CallArgs::from_positional(&"http://masjid-1.com").unwrap();

        {
            let memo = Memoizer::from_config(&config).unwrap();
            memo.get_or_compute(&args, || 500u32).unwrap();
        }

        let memo = Memoizer::from_config(&config).unwrap();
        let value: u32 = memo
            .get_or_compute(&args, || panic!("should be served from disk"))
            .unwrap();
        assert_eq!(value, 500);
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn test_threads_share_a_memoizer() {
        let (_temp_dir, memo) = temp_memoizer(Duration::from_secs(60));
        let memo = Arc::new(memo);
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let memo = Arc::clone(&memo);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    for i in 0..10 {
                        let args = CallArgs::from_positional(&(t, i)).unwrap();
                        let value = memo
                            .get_or_compute(&args, || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                t * 10 + i
                            })
                            .unwrap();
                        assert_eq!(value, t * 10 + i);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker panicked");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 40);

        // Everything is cached now.
        for t in 0..4 {
            for i in 0..10 {
                let args = CallArgs::from_positional(&(t, i)).unwrap();
                let value: i32 = memo.get_or_compute(&args, || -1).unwrap();
                assert_eq!(value, t * 10 + i);
            }
        }
    }
}
