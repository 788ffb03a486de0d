// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The `Store` collaborator: a byte-keyed persistent map, plus [`Batch`], the
//! accumulator that [`crate::Trie::commit`] writes through.
//!
//! The core depends on [`NodeStore`] only through this trait — persistence, compaction and any
//! transactional semantics beyond what `write_batch` promises (atomic application) are the
//! collaborator's concern, not the trie's.

use anyhow::Result;
use bytes::Bytes;

/// The reserved key under which the current committed root digest is stored.
pub const STATE_KEY: u8 = 0x73;

/// A content-addressed byte-to-byte key/value store backing a [`crate::Trie`].
///
/// Keys are either node digests (hash-width bytes) or the single reserved [`STATE_KEY`] byte.
pub trait NodeStore {
    /// Looks up `key`. Returns `Ok(None)` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// True iff `key` is present. The default forwards to [`NodeStore::get`].
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Applies every write in `batch` atomically.
    fn write_batch(&self, batch: Batch) -> Result<()>;
}

/// An accumulator of `(key, bytes)` writes produced by a single [`crate::Trie::commit`] call.
///
/// Writes appear in the batch in post-order of the tree walk, with the [`STATE_KEY`] write
/// appended last.
#[derive(Debug, Default)]
pub struct Batch {
    writes: Vec<(Vec<u8>, Bytes)>,
}

impl Batch {
    pub fn new() -> Self {
        Batch { writes: Vec::new() }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Bytes) {
        self.writes.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Drains the accumulated writes in insertion order.
    pub fn into_writes(self) -> Vec<(Vec<u8>, Bytes)> {
        self.writes
    }
}
