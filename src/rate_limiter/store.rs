//! # Per-Key Bucket Store
//!
//! Maps keys to their token buckets and serializes mutation per key.
//!
//! ## Architecture
//!
//! ```text
//!     Callers:
//!     "10.0.0.1" ──┐
//!     "10.0.0.2" ──┤
//!     "api-key-7" ─┼──► BucketStore
//!     "10.0.0.1" ──┘         │
//!                            ▼
//!                   ┌─────────────────────┐
//!                   │  DashMap (sharded)  │
//!                   │  key → Arc<Mutex<>> │ ◄── shard lock held only for
//!                   │  key → Arc<Mutex<>> │     lookup / insert
//!                   └─────────┬───────────┘
//!                             ▼
//!                   per-key Mutex<Bucket>   ◄── held for refill + consume
//! ```
//!
//! Two callers on the same key queue on that key's mutex; callers on
//! different keys never wait on each other beyond a brief shard lookup.

use super::{bucket::Bucket, config::LimiterConfig};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Shared, lockable handle to one key's bucket.
pub type BucketHandle = Arc<Mutex<Bucket>>;

/// Expected number of tracked keys per shard when pre-sizing the map.
const INITIAL_KEYS_PER_SHARD: usize = 64;

/// Concurrent key → bucket map.
///
/// ## Example
///
/// ```rust
/// use std::time::Instant;
/// use tokengate::{BucketStore, LimiterConfig};
///
/// let store = BucketStore::new();
/// let config = LimiterConfig::per_second(5).with_capacity(5);
/// let now = Instant::now();
///
/// let handle = store.get_or_create("client-a", now, &config);
/// let decision = handle.lock().try_consume(&config, now);
/// assert!(decision.allowed);
/// assert_eq!(store.len(), 1);
/// ```
pub struct BucketStore {
    buckets: DashMap<String, BucketHandle, ahash::RandomState>,

    /// Buckets created since startup.
    total_created: AtomicU64,

    /// Buckets removed by resets since startup.
    total_removed: AtomicU64,
}

impl BucketStore {
    /// Creates an empty store sharded for the available parallelism.
    pub fn new() -> Self {
        // More shards = less contention but more memory overhead.
        // dashmap requires a power of two greater than one.
        let num_shards = std::thread::available_parallelism()
            .map(|n| n.get() * 4)
            .unwrap_or(16)
            .next_power_of_two()
            .clamp(4, 256);

        Self {
            buckets: DashMap::with_capacity_and_hasher_and_shard_amount(
                num_shards * INITIAL_KEYS_PER_SHARD,
                ahash::RandomState::new(),
                num_shards,
            ),
            total_created: AtomicU64::new(0),
            total_removed: AtomicU64::new(0),
        }
    }

    /// Returns the key's bucket, creating a full one on first use.
    ///
    /// The shard lock is released before returning; lock the handle to
    /// mutate the bucket.
    #[inline]
    pub fn get_or_create(&self, key: &str, now: Instant, config: &LimiterConfig) -> BucketHandle {
        // Fast path: existing key, read lock on one shard.
        if let Some(existing) = self.buckets.get(key) {
            return Arc::clone(existing.value());
        }

        // Slow path: another caller may insert between the check and here.
        let entry = self.buckets.entry(key.to_owned()).or_insert_with(|| {
            self.total_created.fetch_add(1, Ordering::Relaxed);
            debug!(key, capacity = config.capacity, "created bucket");
            Arc::new(Mutex::new(Bucket::new(config, now)))
        });
        Arc::clone(entry.value())
    }

    /// Copy of the key's bucket, if it exists.
    pub fn peek(&self, key: &str) -> Option<Bucket> {
        let handle = self.buckets.get(key).map(|entry| Arc::clone(entry.value()))?;
        let bucket = *handle.lock();
        Some(bucket)
    }

    /// Forgets a key; its next use starts from a fresh full bucket.
    ///
    /// Returns `true` if the key was present.
    pub fn reset(&self, key: &str) -> bool {
        let removed = self.buckets.remove(key).is_some();
        if removed {
            self.total_removed.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Forgets every key. Returns how many were removed.
    pub fn reset_all(&self) -> usize {
        let mut removed = 0usize;
        for key in self.keys() {
            if self.buckets.remove(&key).is_some() {
                removed += 1;
            }
        }
        self.total_removed.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Snapshot of the tracked keys.
    ///
    /// The map is not held locked after this returns; keys added or removed
    /// afterwards are not reflected.
    pub fn keys(&self) -> Vec<String> {
        self.buckets.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Runs `f` for every key in a [`keys`](Self::keys) snapshot.
    pub fn for_each_key<F>(&self, mut f: F)
    where
        F: FnMut(&str),
    {
        for key in self.keys() {
            f(&key);
        }
    }

    /// Number of tracked keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// `true` if no key is tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bookkeeping counters for monitoring.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            active_keys: self.len(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
        }
    }
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketStore")
            .field("active_keys", &self.len())
            .field("total_created", &self.total_created.load(Ordering::Relaxed))
            .field("total_removed", &self.total_removed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Counters describing the store's population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys currently holding a bucket.
    pub active_keys: usize,

    /// Buckets created since startup.
    pub total_created: u64,

    /// Buckets removed by resets since startup.
    pub total_removed: u64,
}

impl StoreStats {
    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Bucket Store Stats:\n\
             ├─ Active Keys: {}\n\
             └─ Lifetime:\n\
                ├─ Total Created: {}\n\
                └─ Total Removed: {}",
            self.active_keys, self.total_created, self.total_removed
        )
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
