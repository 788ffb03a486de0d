// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The iterator: a lazy, in-order walk over every live `(key, value)` pair reachable
//! from a trie's root. Order is lexicographic nibble order, with a Full's value slot (16) visited
//! last among its 17 children.
//!
//! Built as an explicit stack of pending subtrees rather than a recursive walk, so [`Node::Hash`]
//! resolution happens one node at a time as the caller pulls items, instead of materializing the
//! whole tree up front. Behavior if the trie is mutated mid-iteration is undefined; this type does
//! not attempt to detect or guard against it.

use crate::codec;
use crate::error::TrieError;
use crate::hash::{Digest, Hasher};
use crate::nibble::{self, Nibbles};
use crate::node::Node;
use crate::store::NodeStore;
use crate::trie::Trie;
use bytes::Bytes;
use std::rc::Rc;

struct Frame {
    node: Rc<Node>,
    prefix: Nibbles,
}

/// A lazy in-order iterator over a [`Trie`]'s live leaves.
pub struct Iter<'a, H: Hasher> {
    trie: &'a Trie<H>,
    stack: Vec<Frame>,
}

impl<'a, H: Hasher> Iter<'a, H> {
    pub(crate) fn new(trie: &'a Trie<H>) -> Self {
        Iter {
            trie,
            stack: vec![Frame {
                node: Rc::clone(trie.root_node()),
                prefix: Vec::new(),
            }],
        }
    }
}

impl<'a, H: Hasher> Iterator for Iter<'a, H> {
    type Item = Result<(Vec<u8>, Bytes), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match frame.node.as_ref() {
                Node::Null => continue,
                Node::Value(v) => {
                    return Some(Ok((nibble::from_nibbles(&frame.prefix), v.clone())));
                }
                Node::Hash(d) => match resolve(self.trie, d, &frame.prefix) {
                    Ok(resolved) => self.stack.push(Frame {
                        node: Rc::new(resolved),
                        prefix: frame.prefix,
                    }),
                    Err(e) => return Some(Err(e)),
                },
                Node::Short(s) => {
                    let child_prefix = nibble::concat(&frame.prefix, &s.key);
                    self.stack.push(Frame {
                        node: Rc::clone(&s.val),
                        prefix: child_prefix,
                    });
                }
                Node::Full(f) => {
                    // Slot 16 goes on the bottom so it pops last; 15 down to 0 go on top in
                    // descending order so popping yields ascending nibble order.
                    self.stack.push(Frame {
                        node: Rc::clone(&f.children[16]),
                        prefix: frame.prefix.clone(),
                    });
                    for i in (0..16).rev() {
                        let child_prefix = nibble::concat(&frame.prefix, &[i as u8]);
                        self.stack.push(Frame {
                            node: Rc::clone(&f.children[i]),
                            prefix: child_prefix,
                        });
                    }
                }
            }
        }
        None
    }
}

fn resolve<H: Hasher>(trie: &Trie<H>, digest: &Digest, prefix: &[u8]) -> Result<Node, TrieError> {
    let store = trie.store().ok_or(TrieError::NoDatabase)?;
    let bytes = store
        .get(digest.as_bytes())
        .map_err(|e| TrieError::Store(e.to_string()))?
        .ok_or_else(|| TrieError::MissingNode {
            root_hash: trie.original_root().clone(),
            node_hash: digest.clone(),
            key: safe_from_nibbles(prefix),
            pos: prefix.len(),
        })?;
    codec::decode(&bytes)
}

/// Best-effort byte rendering of a nibble prefix for error messages: the iterator may hold a
/// Hash node at an odd nibble offset, which [`nibble::from_nibbles`] cannot represent exactly,
/// so the trailing odd nibble (if any) is dropped rather than panicking.
fn safe_from_nibbles(nibbles: &[u8]) -> Vec<u8> {
    let even_len = nibbles.len() - (nibbles.len() % 2);
    nibble::from_nibbles(&nibbles[..even_len])
}

impl<H: Hasher> Trie<H> {
    /// Returns a lazy in-order iterator over every live `(key, value)` pair in the trie.
    pub fn iter(&self) -> Iter<'_, H> {
        Iter::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Keccak256;
    use crate::mem_store::MemoryStore;

    #[test]
    fn iterates_in_ascending_nibble_order() {
        // Nibble order, not byte-lexicographic order: at the branch separating 0x01 from
        // 0x0102, the continuing path (nibble 0) sorts before the terminator (nibble 16, the
        // value slot visits last within a Full) — so the longer key that shares a prefix with a
        // shorter one is emitted first.
        let mut trie = Trie::with_store(Keccak256, Rc::new(MemoryStore::new()));
        trie.insert(&[0x01, 0x02], Bytes::from_static(b"z")).unwrap();
        trie.insert(&[0x02], Bytes::from_static(b"y")).unwrap();
        trie.insert(&[0x01], Bytes::from_static(b"x")).unwrap();

        let collected: Vec<(Vec<u8>, Bytes)> = trie.iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            collected,
            vec![
                (vec![0x01, 0x02], Bytes::from_static(b"z")),
                (vec![0x01], Bytes::from_static(b"x")),
                (vec![0x02], Bytes::from_static(b"y")),
            ]
        );
    }

    #[test]
    fn empty_trie_iterates_to_nothing() {
        let trie = Trie::with_store(Keccak256, Rc::new(MemoryStore::new()));
        assert_eq!(trie.iter().count(), 0);
    }

    #[test]
    fn resolves_hash_nodes_lazily_after_reopen() {
        let store = Rc::new(MemoryStore::new());
        let mut trie = Trie::with_store(Keccak256, store.clone());
        trie.insert(&[0x01], Bytes::from_static(b"a")).unwrap();
        trie.insert(&[0x02], Bytes::from_static(b"b")).unwrap();
        let digest = trie.commit().unwrap();

        let reopened = Trie::open(Keccak256, store, Some(digest)).unwrap();
        let collected: Vec<(Vec<u8>, Bytes)> = reopened.iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            collected,
            vec![
                (vec![0x01], Bytes::from_static(b"a")),
                (vec![0x02], Bytes::from_static(b"b")),
            ]
        );
    }
}
