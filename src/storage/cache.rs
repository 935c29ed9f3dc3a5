// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for verified blob reads.
//!
//! Blobs are immutable and content-addressed, so a body that passed
//! integrity checks once can be served again without refetching chunks.
//! Entries still expire so storage-side expiry is eventually observed.
//!
//! The cache is bounded twice: by entry count and by the total size of the
//! cached bodies. Bodies larger than the byte budget are never cached.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

use crate::types::BlobId;

struct CacheEntry {
    files: Arc<Vec<Vec<u8>>>,
    bytes: usize,
    inserted_at: Instant,
}

struct CacheInner {
    entries: LruCache<BlobId, CacheEntry>,
    total_bytes: usize,
}

impl CacheInner {
    fn remove(&mut self, blob_id: &BlobId) {
        if let Some(entry) = self.entries.pop(blob_id) {
            self.total_bytes -= entry.bytes;
        }
    }
}

/// In-process LRU cache of verified blob contents (ciphertext only).
pub struct BlobCache {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
    ttl: Duration,
}

impl BlobCache {
    /// - `capacity`: max number of blobs kept.
    /// - `max_bytes`: max total size of the cached bodies.
    /// - `ttl`: time-to-live of each entry.
    pub fn new(capacity: usize, max_bytes: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                total_bytes: 0,
            }),
            max_bytes,
            ttl,
        }
    }

    /// Cached files of a blob, if present and fresh.
    pub fn get(&self, blob_id: &BlobId) -> Option<Arc<Vec<Vec<u8>>>> {
        let mut inner = self.inner.lock().ok()?;
        match inner.entries.get(blob_id) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.files.clone())
            }
            Some(_) => inner.remove(blob_id),
            None => {}
        }
        None
    }

    pub fn put(&self, blob_id: BlobId, files: Arc<Vec<Vec<u8>>>) {
        let bytes: usize = files.iter().map(Vec::len).sum();
        if bytes > self.max_bytes {
            debug!(%blob_id, bytes, max_bytes = self.max_bytes, "Blob too large to cache");
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        inner.remove(&blob_id);
        while inner.total_bytes + bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.total_bytes -= evicted.bytes,
                None => break,
            }
        }

        let entry = CacheEntry {
            files,
            bytes,
            inserted_at: Instant::now(),
        };
        // at entry capacity `push` hands back the evicted entry
        if let Some((_, evicted)) = inner.entries.push(blob_id, entry) {
            inner.total_bytes -= evicted.bytes;
        }
        inner.total_bytes += bytes;
    }

    /// Total size of the cached bodies.
    pub fn cached_bytes(&self) -> usize {
        self.inner.lock().map(|inner| inner.total_bytes).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn files() -> Arc<Vec<Vec<u8>>> {
        Arc::new(vec![b"ciphertext".to_vec()])
    }

    fn body(len: usize) -> Arc<Vec<Vec<u8>>> {
        Arc::new(vec![vec![0u8; len]])
    }

    #[test]
    fn put_and_get() {
        let cache = BlobCache::new(4, MIB, Duration::from_secs(60));
        let id = BlobId::from_bytes([1; 32]);
        assert!(cache.get(&id).is_none());
        cache.put(id, files());
        assert_eq!(cache.get(&id).unwrap()[0], b"ciphertext");
        assert_eq!(cache.cached_bytes(), b"ciphertext".len());
    }

    #[test]
    fn entries_expire() {
        let cache = BlobCache::new(4, MIB, Duration::from_millis(1));
        let id = BlobId::from_bytes([2; 32]);
        cache.put(id, files());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&id).is_none());
        assert_eq!(cache.cached_bytes(), 0);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = BlobCache::new(1, MIB, Duration::from_secs(60));
        let a = BlobId::from_bytes([3; 32]);
        let b = BlobId::from_bytes([4; 32]);
        cache.put(a, files());
        cache.put(b, files());
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert_eq!(cache.cached_bytes(), b"ciphertext".len());
    }

    #[test]
    fn byte_budget_evicts_oldest_bodies() {
        let cache = BlobCache::new(64, 100, Duration::from_secs(60));
        let a = BlobId::from_bytes([5; 32]);
        let b = BlobId::from_bytes([6; 32]);
        let c = BlobId::from_bytes([7; 32]);

        cache.put(a, body(40));
        cache.put(b, body(40));
        assert_eq!(cache.cached_bytes(), 80);

        // a is the least recently used once b is read
        assert!(cache.get(&b).is_some());
        cache.put(c, body(40));
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.cached_bytes(), 80);
    }

    #[test]
    fn bodies_over_budget_are_not_cached() {
        let cache = BlobCache::new(64, 100, Duration::from_secs(60));
        let small = BlobId::from_bytes([8; 32]);
        let large = BlobId::from_bytes([9; 32]);

        cache.put(small, body(10));
        cache.put(large, body(101));
        assert!(cache.get(&large).is_none());
        assert!(cache.get(&small).is_some());
        assert_eq!(cache.cached_bytes(), 10);
    }

    #[test]
    fn replacing_an_entry_keeps_the_byte_count() {
        let cache = BlobCache::new(4, 100, Duration::from_secs(60));
        let id = BlobId::from_bytes([10; 32]);
        cache.put(id, body(30));
        cache.put(id, body(50));
        assert_eq!(cache.cached_bytes(), 50);
    }
}
