// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! An in-memory [`NodeStore`], in the same shape as a test mock store: a `RwLock`-guarded hash
//! map keyed by digest (or the reserved state key).
//!
//! Useful for tests and as a batteries-included backend; it has no persistence and no compaction
//! policy, so it is not a substitute for a real store in production.

use crate::store::{Batch, NodeStore};
use anyhow::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes an entry directly, bypassing `write_batch`. Used by tests that want to simulate a
    /// store corrupting or pruning a node out from under the trie.
    pub fn remove(&self, key: &[u8]) -> Option<Bytes> {
        self.entries.write().unwrap().remove(key)
    }
}

impl NodeStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn write_batch(&self, batch: Batch) -> Result<()> {
        let mut guard = self.entries.write().unwrap();
        for (key, value) in batch.into_writes() {
            guard.insert(key, value);
        }
        Ok(())
    }
}
