//! Bounded LRU cache for token counts
//!
//! Keyed by `(method, content hash)`. Entries expire after a TTL and the
//! oldest entries are evicted once capacity is reached. Recency is tracked
//! with stamped queue entries so a cache hit never rewrites the whole queue.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::counter::{Accuracy, CountMethod};

/// Cache counters; cheap to clone, updated under the cache lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Total time spent computing uncached counts, in microseconds
    pub total_time_us: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    tokens: usize,
    method: CountMethod,
    accuracy: Accuracy,
    inserted_at: Instant,
    /// Recency stamp; queue slots with a stale stamp are skipped on eviction
    stamp: u64,
}

struct Inner {
    map: HashMap<u64, Entry>,
    /// (key, stamp) in recency order, oldest first
    order: VecDeque<(u64, u64)>,
    next_stamp: u64,
    stats: CacheStats,
}

/// Bounded LRU with TTL for `(method, content)` token counts
pub struct TokenCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl TokenCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                next_stamp: 0,
                stats: CacheStats::default(),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Look up a cached count, refreshing its recency on hit
    pub fn get(&self, key: u64) -> Option<(usize, CountMethod, Accuracy)> {
        let mut inner = self.inner.lock();

        let fresh = match inner.map.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(*entry),
            Some(_) => None,
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        match fresh {
            Some(mut entry) => {
                entry.stamp = inner.next_stamp;
                inner.next_stamp += 1;
                let stamp = entry.stamp;
                inner.map.insert(key, entry);
                inner.order.push_back((key, stamp));
                inner.stats.hits += 1;
                Some((entry.tokens, entry.method, entry.accuracy))
            }
            None => {
                // Expired: drop the entry, count as a miss
                inner.map.remove(&key);
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a computed count, evicting least-recently-used entries as
    /// needed, and record the time it took to compute
    pub fn insert(
        &self,
        key: u64,
        tokens: usize,
        method: CountMethod,
        accuracy: Accuracy,
        elapsed: Duration,
    ) {
        let mut inner = self.inner.lock();
        inner.stats.total_time_us += elapsed.as_micros() as u64;

        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        inner.map.insert(
            key,
            Entry {
                tokens,
                method,
                accuracy,
                inserted_at: Instant::now(),
                stamp,
            },
        );
        inner.order.push_back((key, stamp));

        while inner.map.len() > self.capacity {
            match inner.order.pop_front() {
                Some((old_key, old_stamp)) => {
                    let current = inner.map.get(&old_key).map(|e| e.stamp);
                    if current == Some(old_stamp) {
                        inner.map.remove(&old_key);
                        inner.stats.evictions += 1;
                    }
                    // Stale queue slot: the key was touched since, skip it
                }
                None => break,
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
