// Concurrent Access Tests for blockcache
// These tests verify thread-safety and accounting under concurrent access

use blockcache::{AdmitOutcome, BlockCache, BlockKey, CacheConfig, CacheProperties};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn cache(capacity: u64, use_thread: bool) -> Arc<BlockCache> {
    let props = CacheProperties::new().use_eviction_thread(use_thread).map_concurrency_level(8);
    Arc::new(BlockCache::new(CacheConfig::new(capacity, props).unwrap()).unwrap())
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn assert_accounting(cache: &BlockCache) {
    let stats = cache.stats();
    assert_eq!(stats.occupied_by_priority.iter().sum::<u64>(), stats.occupied_bytes);
    assert_eq!(stats.block_count, cache.len() as u64);
}

/// Test concurrent admissions and lookups from multiple threads
#[test]
fn test_concurrent_admit_and_lookup() {
    env_logger::try_init().ok();
    let cache = cache(64 * 1024 * 1024, false);

    let num_threads = 8;
    let blocks_per_thread = 200;
    let block_size = 64;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let cache_clone = Arc::clone(&cache);
        let handle = thread::spawn(move || {
            for i in 0..blocks_per_thread {
                let key = BlockKey::new(thread_id, i);
                let data = Bytes::from(vec![thread_id as u8; block_size]);
                assert_eq!(cache_clone.admit(key, data, None, false), AdmitOutcome::Admitted);

                let handle = cache_clone.lookup(&key).unwrap();
                assert_eq!(handle.data()[0], thread_id as u8);
            }
        });
        handles.push(handle);
    }

    // Wait for all threads to complete
    for handle in handles {
        handle.join().unwrap();
    }

    let expected_blocks = (num_threads * blocks_per_thread) as usize;
    assert_eq!(cache.len(), expected_blocks);
    assert_eq!(cache.size(), expected_blocks as u64 * block_size as u64);

    let stats = cache.stats();
    assert_eq!(stats.hit_count, expected_blocks as u64);
    assert_eq!(stats.eviction_count, 0);
    assert_accounting(&cache);
}

/// Test that only one of several racing admissions of the same key wins
#[test]
fn test_racing_admissions_of_same_key() {
    let cache = cache(1024 * 1024, false);
    let barrier = Arc::new(Barrier::new(10));
    let admitted = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for thread_id in 0..10u8 {
        let cache_clone = Arc::clone(&cache);
        let barrier_clone = Arc::clone(&barrier);
        let admitted_clone = Arc::clone(&admitted);
        handles.push(thread::spawn(move || {
            barrier_clone.wait();
            for i in 0..100 {
                let data = Bytes::from(vec![thread_id; 32]);
                if cache_clone.admit(BlockKey::new(1, i), data, None, false) == AdmitOutcome::Admitted {
                    admitted_clone.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::Relaxed), 100);
    assert_eq!(cache.len(), 100);
    assert_eq!(cache.size(), 100 * 32);
    assert_accounting(&cache);
}

/// Test admissions racing invalidations of the same keys
#[test]
fn test_concurrent_admit_and_invalidate() {
    let cache = cache(1024 * 1024, false);
    let num_keys = 64u64;
    let size_of = |i: u64| ((i % 7) + 1) * 16;

    let mut handles = vec![];
    for _ in 0..4 {
        let cache_clone = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for round in 0..50 {
                for i in 0..num_keys {
                    let data = Bytes::from(vec![0u8; size_of(i) as usize]);
                    cache_clone.admit(BlockKey::new(3, i), data, None, round % 5 == 0);
                }
            }
        }));
    }
    for _ in 0..4 {
        let cache_clone = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                for i in (0..num_keys).rev() {
                    cache_clone.invalidate(&BlockKey::new(3, i));
                    cache_clone.lookup(&BlockKey::new(3, i));
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let live: u64 = (0..num_keys)
        .filter(|&i| cache.contains(&BlockKey::new(3, i)))
        .map(size_of)
        .sum();
    assert_eq!(cache.size(), live);
    assert_accounting(&cache);
}

/// Test that the background worker brings occupancy back under the watermark
#[test]
fn test_background_eviction_converges() {
    env_logger::try_init().ok();
    let capacity = 100_000;
    let cache = cache(capacity, true);
    assert!(cache.has_eviction_thread());

    let mut handles = vec![];
    for thread_id in 0..4 {
        let cache_clone = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                let data = Bytes::from(vec![0u8; 100]);
                cache_clone.admit(BlockKey::new(thread_id, i), data, None, i % 10 == 0);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let acceptable = cache.config().acceptable_bytes();
    assert!(
        wait_until(Duration::from_secs(15), || cache.size() < acceptable),
        "occupancy stuck at {} (acceptable {})",
        cache.size(),
        acceptable
    );

    let stats = cache.stats();
    assert!(stats.eviction_runs > 0);
    assert!(stats.eviction_count > 0);
    assert_accounting(&cache);
}

/// Test that a handle stays readable while other threads force its eviction
#[test]
fn test_handle_survives_concurrent_eviction() {
    let cache = cache(10_000, false);
    let key = BlockKey::new(0, 0);
    cache.admit(key, Bytes::from(vec![42u8; 1000]), None, false);
    let held = cache.lookup(&key).unwrap();

    let mut handles = vec![];
    for thread_id in 1..5 {
        let cache_clone = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                cache_clone.admit(BlockKey::new(thread_id, i), Bytes::from(vec![0u8; 100]), None, false);
            }
        }));
    }

    // Read the handle while evictions are running
    for _ in 0..1000 {
        assert!(held.data().iter().all(|&b| b == 42));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(cache.stats().eviction_count > 0);
    assert_eq!(held.size(), 1000);
    assert_eq!(held.data().as_ref(), &[42u8; 1000][..]);
}

/// Test shutting down the worker while writers keep admitting
#[test]
fn test_shutdown_with_active_writers() {
    let cache = cache(50_000, true);
    let stop = Arc::new(AtomicBool::new(false));

    let mut handles = vec![];
    for thread_id in 0..4 {
        let cache_clone = Arc::clone(&cache);
        let stop_clone = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut i = 0;
            while !stop_clone.load(Ordering::Relaxed) && i < 20_000 {
                cache_clone.admit(BlockKey::new(thread_id, i), Bytes::from(vec![0u8; 100]), None, false);
                i += 1;
            }
        }));
    }

    thread::sleep(Duration::from_millis(20));
    cache.shutdown();
    assert!(!cache.has_eviction_thread());

    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    // eviction now runs inline on the admitting thread
    cache.admit(BlockKey::new(99, 0), Bytes::from(vec![0u8; 100]), None, false);
    assert!(cache.size() < cache.config().acceptable_bytes());
    assert_accounting(&cache);

    // second shutdown is a no-op
    cache.shutdown();
}
