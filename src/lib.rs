// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! An authenticated, persistent ordered key/value map addressed by a Merkle-Patricia root hash.
//!
//! Given a [`NodeStore`] (a content-addressed byte-to-byte key/value database) and a [`Hasher`],
//! [`Trie`] provides insertion, lookup, deletion, deterministic root-hash computation, commit to
//! the store, rollback via root snapshot, and cryptographic inclusion/exclusion proofs.
//!
//! The hard part — and the part this crate owns — is the four-variant node algebra and the
//! recursive insert/remove rewrites that keep the tree's shape canonical, on-demand
//! materialization of subtrees from the store interleaved with mutation, and a Hasher/proof
//! pair that share exactly one inline-vs-hash rule. The cryptographic hash implementation, the
//! backing store, and the node codec are external collaborators reached only through the
//! [`Hasher`], [`NodeStore`] and (internally) codec traits — swap in your own without touching
//! the engine.
//!
//! ```
//! use patricia_trie::{Keccak256, MemoryStore, Trie};
//! use bytes::Bytes;
//! use std::rc::Rc;
//!
//! let mut trie = Trie::with_store(Keccak256, Rc::new(MemoryStore::new()));
//! trie.insert(b"do", Bytes::from_static(b"verb")).unwrap();
//! trie.insert(b"dog", Bytes::from_static(b"puppy")).unwrap();
//! let root = trie.commit().unwrap();
//! assert_eq!(trie.get(b"dog").unwrap(), Some(Bytes::from_static(b"puppy")));
//! ```

mod codec;
mod error;
mod hash;
mod hasher;
mod iterator;
mod mem_store;
mod nibble;
mod node;
mod proof;
mod store;
mod trie;

#[cfg(test)]
mod proptests;

pub use error::{ProofError, TrieError};
pub use hash::{Digest, Hasher, Keccak256};
pub use iterator::Iter;
pub use mem_store::MemoryStore;
pub use proof::{prove, verify, ProofOutcome};
pub use store::{Batch, NodeStore, STATE_KEY};
pub use trie::Trie;
