// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The Hasher: a recursive post-order walk that computes canonical digests, decides
//! per-child whether to inline or replace with a [`Node::Hash`], and (when given a batch) emits
//! the writes a commit needs.
//!
//! This Hasher is purely functional rather than mutating a lazily-populated cache cell behind
//! `&self`: it returns a *new* parallel tree with updated [`Flags`], which the engine swaps in as
//! its new root rather than hashing in place. A `Cell`-based in-place variant would save some
//! clones and is worth lifting here if profiling ever shows it matters, but the swap-in model was
//! the simpler one to get right first.

use crate::codec;
use crate::hash::{Digest, Hasher};
use crate::node::{Flags, FullNode, Node, ShortNode};
use crate::store::Batch;
use std::rc::Rc;
use tracing::trace;

/// Drives one hashing pass over a tree rooted at some node.
pub(crate) struct TreeHasher<'a, H: Hasher> {
    hasher: &'a H,
    batch: Option<&'a mut Batch>,
    current_gen: u64,
    cache_limit: u64,
}

impl<'a, H: Hasher> TreeHasher<'a, H> {
    pub fn new(
        hasher: &'a H,
        batch: Option<&'a mut Batch>,
        current_gen: u64,
        cache_limit: u64,
    ) -> Self {
        TreeHasher {
            hasher,
            batch,
            current_gen,
            cache_limit,
        }
    }

    /// Hashes the trie's root, always promoting the result to a [`Node::Hash`] even if the root's
    /// own encoding is shorter than the hash width.
    ///
    /// Returns `(root_digest, cached_tree)` where `cached_tree` is what the engine should swap in
    /// as the new in-memory root.
    pub fn hash_root(&mut self, root: &Rc<Node>) -> (Digest, Rc<Node>) {
        match root.as_ref() {
            Node::Hash(d) => (d.clone(), Rc::clone(root)),
            Node::Null => {
                let bytes = codec::encode(&Node::Null);
                let digest = self.hasher.digest(&bytes);
                self.write(&digest, bytes);
                (digest, Rc::clone(root))
            }
            Node::Short(_) | Node::Full(_) => {
                let (repr, cached) = self.hash_node(root);
                match repr.as_ref() {
                    Node::Hash(d) => (d.clone(), cached),
                    _ => {
                        // The root's own encoding was shorter than the hash width; force the
                        // promotion the non-root path skips.
                        let bytes = codec::encode(&repr);
                        let digest = self.hasher.digest(&bytes);
                        self.write(&digest, bytes);
                        let flags = Flags {
                            hash: Some(digest.clone()),
                            dirty: false,
                            gen: self.current_gen,
                        };
                        (digest, Rc::new(cached.with_flags(flags)))
                    }
                }
            }
            Node::Value(_) => unreachable!("Value can never be a trie root (invariant 5)"),
        }
    }

    /// Hashes a non-root [`Node::Short`]/[`Node::Full`], returning `(representative, cached)`
    /// where `representative` is what the *parent* should embed (either `Node::Hash(d)` or an
    /// inline clone with hashed children) and `cached` is the updated node to keep in the tree.
    fn hash_node(&mut self, node: &Rc<Node>) -> (Rc<Node>, Rc<Node>) {
        if let Some(flags) = node.flags() {
            if let Some(hash) = &flags.hash {
                if !flags.dirty && self.current_gen.saturating_sub(flags.gen) <= self.cache_limit {
                    return (Rc::new(Node::Hash(hash.clone())), Rc::clone(node));
                }
            }
        }

        let (encode_form, cached) = match node.as_ref() {
            Node::Short(s) => {
                let (child_repr, child_cached) = self.hash_child(&s.val);
                let encode_form = Node::Short(ShortNode {
                    key: s.key.clone(),
                    val: child_repr,
                    flags: Flags::default(),
                });
                let cached = Node::Short(ShortNode {
                    key: s.key.clone(),
                    val: child_cached,
                    flags: s.flags.clone(),
                });
                (encode_form, cached)
            }
            Node::Full(f) => {
                let mut repr_children: [Rc<Node>; 17] = std::array::from_fn(|_| Rc::new(Node::Null));
                let mut cached_children: [Rc<Node>; 17] =
                    std::array::from_fn(|_| Rc::new(Node::Null));
                for i in 0..17 {
                    let (repr, cached) = self.hash_child(&f.children[i]);
                    repr_children[i] = repr;
                    cached_children[i] = cached;
                }
                let encode_form = Node::Full(Box::new(FullNode {
                    children: repr_children,
                    flags: Flags::default(),
                }));
                let cached = Node::Full(Box::new(FullNode {
                    children: cached_children,
                    flags: f.flags.clone(),
                }));
                (encode_form, cached)
            }
            other => return (Rc::new(other.clone()), Rc::clone(node)),
        };

        let bytes = codec::encode(&encode_form);
        if bytes.len() >= self.hasher.size() {
            let digest = self.hasher.digest(&bytes);
            self.write(&digest, bytes);
            let flags = Flags {
                hash: Some(digest.clone()),
                dirty: false,
                gen: self.current_gen,
            };
            (
                Rc::new(Node::Hash(digest)),
                Rc::new(cached.with_flags(flags)),
            )
        } else {
            (Rc::new(encode_form), Rc::new(cached))
        }
    }

    /// Hashes a child slot: [`Node::Null`], [`Node::Value`] and already-placeholder
    /// [`Node::Hash`] children pass through untouched; [`Node::Short`]/[`Node::Full`] children
    /// recurse.
    fn hash_child(&mut self, child: &Rc<Node>) -> (Rc<Node>, Rc<Node>) {
        match child.as_ref() {
            Node::Null | Node::Value(_) | Node::Hash(_) => (Rc::clone(child), Rc::clone(child)),
            Node::Short(_) | Node::Full(_) => self.hash_node(child),
        }
    }

    fn write(&mut self, digest: &Digest, bytes: bytes::Bytes) {
        if let Some(batch) = self.batch.as_deref_mut() {
            trace!(digest = %digest, len = bytes.len(), "writing node to commit batch");
            batch.put(digest.as_bytes().to_vec(), bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Keccak256;
    use bytes::Bytes;

    #[test]
    fn hashing_null_root_yields_empty_root_constant() {
        let hasher = Keccak256;
        let mut th = TreeHasher::new(&hasher, None, 0, 64);
        let (digest, cached) = th.hash_root(&Rc::new(Node::Null));
        assert_eq!(digest, hasher.digest(&codec::encode(&Node::Null)));
        assert!(cached.is_null());
    }

    #[test]
    fn hashing_is_deterministic_across_calls() {
        let hasher = Keccak256;
        let leaf = Rc::new(Node::new_short(
            vec![0xa, 0xb, 16],
            Rc::new(Node::Value(Bytes::from_static(b"v"))),
        ));
        let mut th1 = TreeHasher::new(&hasher, None, 0, 64);
        let (d1, _) = th1.hash_root(&leaf);
        let mut th2 = TreeHasher::new(&hasher, None, 0, 64);
        let (d2, _) = th2.hash_root(&leaf);
        assert_eq!(d1, d2);
    }

    #[test]
    fn small_root_is_still_promoted_to_hash() {
        // A single short leaf with a tiny key/value encodes to well under 32 bytes, but the root
        // must still be promoted to a Hash.
        let hasher = Keccak256;
        let leaf = Rc::new(Node::new_short(
            vec![0xa, 16],
            Rc::new(Node::Value(Bytes::from_static(b"x"))),
        ));
        let mut th = TreeHasher::new(&hasher, None, 0, 64);
        let (digest, _) = th.hash_root(&leaf);
        assert_eq!(digest.len(), 32);
    }
}
