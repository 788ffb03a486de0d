// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Error kinds surfaced by the trie engine, proof subsystem and iterator.
//!
//! Every public entry point on [`crate::Trie`] returns `Result<T, TrieError>` rather than
//! `anyhow::Error` so callers can match on the specific failure instead of downcasting, per the
//! per-kind policy table this crate is built against.

use crate::hash::Digest;
use thiserror::Error;

/// Errors raised while walking, mutating or proving a [`crate::Trie`].
#[derive(Debug, Error)]
pub enum TrieError {
    /// A node required to continue an operation was absent from the backing store.
    #[error(
        "missing trie node: root={root_hash:?} node={node_hash:?} key={key:?} pos={pos}"
    )]
    MissingNode {
        /// The root the walk started from (`originalRoot` at the time of the call).
        root_hash: Digest,
        /// The digest of the node that could not be resolved.
        node_hash: Digest,
        /// The full byte key of the operation that triggered resolution.
        key: Vec<u8>,
        /// The nibble offset into `key` at which resolution was attempted.
        pos: usize,
    },

    /// An operation that requires a backing store was invoked on a store-less trie.
    #[error("operation requires a node store but none is configured")]
    NoDatabase,

    /// `open`/`inject` was given a root digest of the wrong length for the configured hasher.
    #[error("invalid root digest: expected {expected_len} bytes, got {actual_len}")]
    InvalidRoot {
        expected_len: usize,
        actual_len: usize,
    },

    /// Decoded bytes do not form a structurally valid node.
    #[error("invalid node encoding: {0}")]
    InvalidNode(String),

    /// The backing `NodeStore` itself faulted (I/O, corruption, ...), as opposed to a clean
    /// cache miss (that's `MissingNode`). Not one of the kinds named in the per-kind policy
    /// table, which only covers faults internal to the trie's own reasoning; surfaced anyway so
    /// a collaborator fault can't silently masquerade as `MissingNode`.
    #[error("node store error: {0}")]
    Store(String),
}

/// The outcome of [`crate::proof::verify`]: either the proof authenticates that `key` maps to a
/// value, or it authenticates that `key` is absent from the trie. Unlike [`TrieError`] this is not
/// a fatal condition — see [`ProofError`] for that.
#[derive(Debug, Error)]
pub enum ProofError {
    /// A digest referenced by the walk was not present in the supplied proof list.
    #[error("proof is missing a node for digest {0}")]
    MissingDigest(Digest),

    /// A proof entry failed to decode as a node.
    #[error("proof node failed to decode: {0}")]
    InvalidNode(String),

    /// The reconstructed root does not match the expected root.
    #[error("verification failed: reconstructed root does not match expected root")]
    RootMismatch,
}
