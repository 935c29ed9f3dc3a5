// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process storage node for sandbox mode and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::node::{ChunkStat, NodeError, StorageNode, StoreResponse};
use crate::types::ChunkId;

/// Storage node backed by a hash map, with fault switches.
pub struct InMemoryStorageNode {
    id: String,
    chunks: Mutex<HashMap<ChunkId, Vec<u8>>>,
    offline: AtomicBool,
    failing_stores: AtomicUsize,
    store_delay_ms: AtomicUsize,
    store_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryStorageNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chunks: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            failing_stores: AtomicUsize::new(0),
            store_delay_ms: AtomicUsize::new(0),
            store_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    fn chunks(&self) -> MutexGuard<'_, HashMap<ChunkId, Vec<u8>>> {
        self.chunks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the node off (or back on) the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `n` store calls as unavailable.
    pub fn fail_next_stores(&self, n: usize) {
        self.failing_stores.store(n, Ordering::SeqCst);
    }

    /// Delay every store call.
    pub fn set_store_delay(&self, delay: Duration) {
        self.store_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Flip the first byte of a held chunk.
    pub fn corrupt(&self, id: &ChunkId) -> bool {
        match self.chunks().get_mut(id) {
            Some(bytes) if !bytes.is_empty() => {
                bytes[0] ^= 0xff;
                true
            }
            Some(bytes) => {
                bytes.push(0);
                true
            }
            None => false,
        }
    }

    pub fn holds(&self, id: &ChunkId) -> bool {
        self.chunks().contains_key(id)
    }

    /// Number of distinct chunks held.
    pub fn held(&self) -> usize {
        self.chunks().len()
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), NodeError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NodeError::Unavailable(format!("{} is offline", self.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageNode for InMemoryStorageNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn store(&self, bytes: Arc<[u8]>, _epochs: u32) -> Result<StoreResponse, NodeError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let failing = self
            .failing_stores
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(NodeError::Unavailable(format!("{} store failed", self.id)));
        }

        let delay = self.store_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        let id = ChunkId::digest(&bytes);
        let mut chunks = self.chunks();
        if chunks.contains_key(&id) {
            return Ok(StoreResponse::AlreadyCertified { blob_id: id });
        }
        chunks.insert(id, bytes.to_vec());
        Ok(StoreResponse::NewlyCreated { blob_id: id })
    }

    async fn fetch(&self, id: &ChunkId) -> Result<Vec<u8>, NodeError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.chunks().get(id).cloned().ok_or(NodeError::NotFound(*id))
    }

    async fn stat(&self, id: &ChunkId) -> Result<ChunkStat, NodeError> {
        self.check_online()?;
        let size = self
            .chunks()
            .get(id)
            .map(|bytes| bytes.len() as u64)
            .ok_or(NodeError::NotFound(*id))?;
        Ok(ChunkStat {
            size,
            content_type: Some("application/octet-stream".to_string()),
        })
    }
}
