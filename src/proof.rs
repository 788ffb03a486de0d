// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The proof subsystem: `prove` builds an ordered list of a key's ancestor node
//! encodings; `verify` reproduces the same inline-vs-hash walk against that list and an expected
//! root to authenticate either a value or its absence.
//!
//! `prove` shares the Hasher's inline-vs-hash rule rather than re-deriving it: it runs a full hashing pass
//! over the tree exactly as [`crate::Trie::commit`] would, then walks the resulting cached tree
//! toward `key`, taking a node's encoding into the proof iff the Hasher gave it a cached hash
//! (i.e. its encoding was at least hash-width) or it is the root (always promoted).

use crate::codec;
use crate::error::{ProofError, TrieError};
use crate::hash::{Digest, Hasher};
use crate::hasher::TreeHasher;
use crate::nibble::{self, TERMINATOR};
use crate::node::Node;
use crate::store::{Batch, NodeStore};
use crate::trie::Trie;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// The outcome of [`verify`]: the proof authenticates either a present value or the key's
/// absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    Present(Bytes),
    Absent,
}

/// Builds the ordered, deduplicated list of node encodings an inclusion/exclusion proof for
/// `key` needs, walking from `trie`'s current root.
pub fn prove<H: Hasher>(trie: &mut Trie<H>, key: &[u8]) -> Result<Vec<Bytes>, TrieError> {
    let mut path = nibble::to_nibbles(key);
    path.push(TERMINATOR);

    let mut batch = Batch::new();
    let cached_root = {
        let root = Rc::clone(trie.root_node());
        let mut th = TreeHasher::new(trie.hasher_ref(), Some(&mut batch), 0, u64::MAX);
        let (_, cached) = th.hash_root(&root);
        cached
    };
    trie.set_root_cache(Rc::clone(&cached_root));

    let writes: HashMap<Vec<u8>, Bytes> = batch.into_writes().into_iter().collect();

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut current = cached_root;
    let mut pos = 0usize;

    loop {
        match current.as_ref() {
            Node::Null | Node::Value(_) => break,
            Node::Hash(d) => {
                let (resolved, bytes) = resolve_for_proof(trie, d, key, pos)?;
                if seen.insert(d.clone()) {
                    out.push(bytes);
                }
                current = Rc::new(resolved);
            }
            Node::Short(s) => {
                record_if_hashed(&current, &writes, &mut seen, &mut out);
                if nibble::starts_with(&path, pos, &s.key) {
                    pos += s.key.len();
                    current = Rc::clone(&s.val);
                } else {
                    break;
                }
            }
            Node::Full(f) => {
                record_if_hashed(&current, &writes, &mut seen, &mut out);
                let idx = path[pos] as usize;
                pos += 1;
                current = Rc::clone(&f.children[idx]);
            }
        }
    }
    Ok(out)
}

fn record_if_hashed(
    node: &Rc<Node>,
    writes: &HashMap<Vec<u8>, Bytes>,
    seen: &mut HashSet<Digest>,
    out: &mut Vec<Bytes>,
) {
    let Some(flags) = node.flags() else { return };
    let Some(hash) = &flags.hash else { return };
    if seen.insert(hash.clone()) {
        if let Some(bytes) = writes.get(hash.as_bytes()) {
            out.push(bytes.clone());
        }
    }
}

/// Fetches and decodes the node at `digest`, returning its decoded form alongside the raw
/// encoded bytes the caller needs to add to the proof (a node reached only via a `Node::Hash`
/// placeholder was never hashed by this walk's own `TreeHasher` pass, so it has no entry in
/// `writes`/`flags.hash` for `record_if_hashed` to find — the bytes fetched here are its only
/// proof representation).
fn resolve_for_proof<H: Hasher>(
    trie: &Trie<H>,
    digest: &Digest,
    key: &[u8],
    pos: usize,
) -> Result<(Node, Bytes), TrieError> {
    let store = trie.store().ok_or(TrieError::NoDatabase)?;
    let bytes = store
        .get(digest.as_bytes())
        .map_err(|e| TrieError::Store(e.to_string()))?
        .ok_or_else(|| TrieError::MissingNode {
            root_hash: trie.original_root().clone(),
            node_hash: digest.clone(),
            key: key.to_vec(),
            pos,
        })?;
    let node = codec::decode(&bytes)?;
    Ok((node, bytes))
}

/// Verifies that `encoded_nodes` authenticates `key`'s value (or absence) under `root_digest`
///. Proof entries are indexed by their digest under `hasher`, the same
/// function that produced them.
pub fn verify<H: Hasher>(
    hasher: &H,
    root_digest: &Digest,
    key: &[u8],
    encoded_nodes: &[Bytes],
) -> Result<ProofOutcome, ProofError> {
    let mut index: HashMap<Digest, Bytes> = HashMap::new();
    for bytes in encoded_nodes {
        index.insert(hasher.digest(bytes), bytes.clone());
    }

    let empty_root = hasher.digest(&codec::encode(&Node::Null));

    let mut path = nibble::to_nibbles(key);
    path.push(TERMINATOR);

    let mut current = if *root_digest == empty_root {
        Node::Null
    } else {
        decode_indexed(&index, root_digest)?
    };
    let mut pos = 0usize;

    loop {
        match current {
            Node::Null => return Ok(ProofOutcome::Absent),
            Node::Value(v) => return Ok(ProofOutcome::Present(v)),
            Node::Hash(d) => {
                current = decode_indexed(&index, &d)?;
            }
            Node::Short(s) => {
                if nibble::starts_with(&path, pos, &s.key) {
                    pos += s.key.len();
                    current = (*s.val).clone();
                } else {
                    return Ok(ProofOutcome::Absent);
                }
            }
            Node::Full(f) => {
                let idx = path[pos] as usize;
                pos += 1;
                current = (*f.children[idx]).clone();
            }
        }
    }
}

fn decode_indexed(index: &HashMap<Digest, Bytes>, digest: &Digest) -> Result<Node, ProofError> {
    let bytes = index
        .get(digest)
        .ok_or_else(|| ProofError::MissingDigest(digest.clone()))?;
    codec::decode(bytes).map_err(|e| ProofError::InvalidNode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Keccak256;
    use crate::mem_store::MemoryStore;
    use crate::trie::Trie;

    fn build_trie() -> (Trie<Keccak256>, Digest) {
        let store = Rc::new(MemoryStore::new());
        let mut trie = Trie::with_store(Keccak256, store);
        trie.insert(&[0xaa], Bytes::from_static(b"a")).unwrap();
        trie.insert(&[0xab], Bytes::from_static(b"b")).unwrap();
        let digest = trie.commit().unwrap();
        (trie, digest)
    }

    #[test]
    fn proves_and_verifies_an_existing_key() {
        let (mut trie, root) = build_trie();
        let proof = prove(&mut trie, &[0xaa]).unwrap();
        assert!(!proof.is_empty());
        let outcome = verify(&Keccak256, &root, &[0xaa], &proof).unwrap();
        assert_eq!(outcome, ProofOutcome::Present(Bytes::from_static(b"a")));
    }

    #[test]
    fn proves_a_key_on_a_freshly_opened_trie_without_a_prior_get() {
        // The root (and every subtree) is still a `Node::Hash` placeholder here — nothing has
        // walked the tree since `open`, so `prove` must resolve and record proof bytes straight
        // from the store rather than relying on an already-hashed in-memory node.
        let store = Rc::new(MemoryStore::new());
        let mut trie = Trie::with_store(Keccak256, store.clone());
        trie.insert(&[0x12, 0x34], Bytes::from_static(b"a")).unwrap();
        trie.insert(&[0x12, 0x56], Bytes::from_static(b"b")).unwrap();
        let root = trie.commit().unwrap();

        let mut fresh = Trie::open(Keccak256, store, Some(root.clone())).unwrap();
        let proof = prove(&mut fresh, &[0x12, 0x34]).unwrap();
        assert!(!proof.is_empty());
        let outcome = verify(&Keccak256, &root, &[0x12, 0x34], &proof).unwrap();
        assert_eq!(outcome, ProofOutcome::Present(Bytes::from_static(b"a")));
    }

    #[test]
    fn s6_exclusion_proof_for_absent_key() {
        let (mut trie, root) = build_trie();
        let proof = prove(&mut trie, &[0xcc]).unwrap();
        let outcome = verify(&Keccak256, &root, &[0xcc], &proof).unwrap();
        assert_eq!(outcome, ProofOutcome::Absent);
    }

    #[test]
    fn exclusion_proof_for_empty_trie() {
        let mut trie = Trie::with_store(Keccak256, Rc::new(MemoryStore::new()));
        let root = trie.root_hash();
        let proof = prove(&mut trie, &[0x01]).unwrap();
        assert!(proof.is_empty());
        let outcome = verify(&Keccak256, &root, &[0x01], &proof).unwrap();
        assert_eq!(outcome, ProofOutcome::Absent);
    }

    #[test]
    fn tampering_with_the_root_digest_breaks_verification() {
        let (mut trie, root) = build_trie();
        let proof = prove(&mut trie, &[0xaa]).unwrap();
        let mut tampered_bytes = root.as_bytes().to_vec();
        tampered_bytes[0] ^= 0xff;
        let tampered_root = Digest::new(tampered_bytes);
        let err = verify(&Keccak256, &tampered_root, &[0xaa], &proof).unwrap_err();
        assert!(matches!(err, ProofError::MissingDigest(_)));
    }

    #[test]
    fn tampering_with_a_proof_byte_breaks_verification() {
        let (mut trie, root) = build_trie();
        let mut proof = prove(&mut trie, &[0xaa]).unwrap();
        let first = proof.first_mut().expect("root is always included in the proof");
        let mut tampered = first.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        *first = Bytes::from(tampered);

        let outcome = verify(&Keccak256, &root, &[0xaa], &proof);
        match outcome {
            Ok(ProofOutcome::Present(v)) => assert_ne!(v, Bytes::from_static(b"a")),
            _ => {}
        }
    }
}
