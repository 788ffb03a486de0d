// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The Trie engine: recursive get/insert/remove rewrites over the in-memory node
//! tree, on-demand hash resolution from the store, and the root lifecycle (`open`/`close`/
//! `commit`/`root_hash`/`snapshot`/`inject`).
//!
//! Insert/remove follow the same shape as every production Merkle-Patricia implementation: keys
//! are walked as a nibble path with a synthetic [`TERMINATOR`] appended, so a branch's 17th slot
//! and a leaf's terminal nibble fall out of one uniform recursion instead of a separate
//! end-of-key special case.

use crate::codec;
use crate::error::TrieError;
use crate::hash::{Digest, Hasher};
use crate::hasher::TreeHasher;
use crate::nibble::{self, Nibbles, TERMINATOR};
use crate::node::{Flags, FullNode, Node, ShortNode};
use crate::store::{Batch, NodeStore, STATE_KEY};
use bytes::Bytes;
use std::rc::Rc;
use tracing::debug;

/// Generations a cached node hash survives without being touched before the Hasher evicts it.
/// Chosen to match the order-of-magnitude default a JMT-style generational cache typically uses;
/// the exact figure isn't load-bearing for correctness.
const DEFAULT_CACHE_LIMIT: u64 = 128;

fn store_err(e: anyhow::Error) -> TrieError {
    TrieError::Store(e.to_string())
}

/// Appends the synthetic terminator to a byte key's nibble path, so every Short that reaches a
/// leaf and every Full's value slot fall out of the same recursive walk.
fn key_path(key: &[u8]) -> Nibbles {
    let mut path = nibble::to_nibbles(key);
    path.push(TERMINATOR);
    path
}

/// Wraps `child` in a fresh `Short(remaining, child)` unless `remaining` is empty, in which case
/// `child` is returned unchanged. Used when splitting a Short to
/// place a subtree at a path it no longer needs its own separate insert walk to reach.
fn leaf_or_short(remaining: &[u8], child: Rc<Node>) -> Rc<Node> {
    if remaining.is_empty() {
        child
    } else {
        Rc::new(Node::new_short(remaining.to_vec(), child))
    }
}

/// An authenticated, persistent ordered key/value map addressed by a Merkle-Patricia root hash.
pub struct Trie<H: Hasher> {
    store: Option<Rc<dyn NodeStore>>,
    hasher: Rc<H>,
    root: Rc<Node>,
    original_root: Digest,
    empty_root: Digest,
    cache_gen: u64,
    cache_limit: u64,
}

impl<H: Hasher> Trie<H> {
    /// Builds a fresh, empty, store-less trie. Operations that need to resolve a [`Node::Hash`]
    /// or commit will fail with [`TrieError::NoDatabase`] until the caller attaches a store via
    /// [`Trie::with_store`] or [`Trie::open`].
    pub fn new(hasher: H) -> Self {
        let empty_root = hasher.digest(&codec::encode(&Node::Null));
        Trie {
            store: None,
            hasher: Rc::new(hasher),
            root: Rc::new(Node::Null),
            original_root: empty_root.clone(),
            empty_root,
            cache_gen: 0,
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }

    /// Builds a fresh, empty trie backed by `store`.
    pub fn with_store(hasher: H, store: Rc<dyn NodeStore>) -> Self {
        let mut trie = Self::new(hasher);
        trie.store = Some(store);
        trie
    }

    /// Opens a trie at `root`, or at the last committed root recorded under [`STATE_KEY`] if
    /// `root` is absent. Fails with [`TrieError::MissingNode`] if the
    /// resolved root digest is non-empty but absent from `store`.
    pub fn open(hasher: H, store: Rc<dyn NodeStore>, root: Option<Digest>) -> Result<Self, TrieError> {
        let empty_root = hasher.digest(&codec::encode(&Node::Null));
        let root_digest = match root {
            Some(d) => d,
            None => match store.get(&[STATE_KEY]).map_err(store_err)? {
                Some(bytes) => Digest::new(bytes.to_vec()),
                None => empty_root.clone(),
            },
        };
        if root_digest.len() != hasher.size() {
            return Err(TrieError::InvalidRoot {
                expected_len: hasher.size(),
                actual_len: root_digest.len(),
            });
        }

        let root_node = if root_digest == empty_root {
            Rc::new(Node::Null)
        } else {
            if !store.has(root_digest.as_bytes()).map_err(store_err)? {
                return Err(TrieError::MissingNode {
                    root_hash: root_digest.clone(),
                    node_hash: root_digest.clone(),
                    key: Vec::new(),
                    pos: 0,
                });
            }
            Rc::new(Node::Hash(root_digest.clone()))
        };

        Ok(Trie {
            store: Some(store),
            hasher: Rc::new(hasher),
            root: root_node,
            original_root: root_digest,
            empty_root,
            cache_gen: 0,
            cache_limit: DEFAULT_CACHE_LIMIT,
        })
    }

    /// Resets the trie to the empty root.
    pub fn close(&mut self) {
        self.root = Rc::new(Node::Null);
        self.original_root = self.empty_root.clone();
        self.cache_gen = 0;
    }

    /// The digest of the last committed (or opened/injected) state.
    pub fn original_root(&self) -> &Digest {
        &self.original_root
    }

    pub(crate) fn root_node(&self) -> &Rc<Node> {
        &self.root
    }

    /// Swaps in a tree produced by hashing this trie's root outside of [`Trie::root_hash`]/
    /// [`Trie::commit`] (used by [`crate::proof::prove`], which must run the same hashing pass
    /// to decide inline-vs-hash but does not itself own `root`).
    pub(crate) fn set_root_cache(&mut self, node: Rc<Node>) {
        self.root = node;
    }

    pub(crate) fn store(&self) -> Option<&Rc<dyn NodeStore>> {
        self.store.as_ref()
    }

    pub(crate) fn hasher_ref(&self) -> &H {
        &self.hasher
    }

    /// Looks up `key`. Resolved [`Node::Hash`] nodes encountered along the way are swapped for
    /// their decoded form in the in-memory tree so later operations skip the store round-trip.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>, TrieError> {
        let path = key_path(key);
        let root = Rc::clone(&self.root);
        let (value, new_root) = self.get_rec(root, key, &path, 0)?;
        self.root = new_root;
        Ok(value)
    }

    fn get_rec(
        &self,
        node: Rc<Node>,
        key: &[u8],
        path: &[u8],
        pos: usize,
    ) -> Result<(Option<Bytes>, Rc<Node>), TrieError> {
        match node.as_ref() {
            Node::Null => Ok((None, node)),
            Node::Value(v) => Ok((Some(v.clone()), node)),
            Node::Short(s) => {
                if nibble::starts_with(path, pos, &s.key) {
                    let (value, new_child) = self.get_rec(Rc::clone(&s.val), key, path, pos + s.key.len())?;
                    let new_node = if Rc::ptr_eq(&new_child, &s.val) {
                        Rc::clone(&node)
                    } else {
                        Rc::new(Node::Short(ShortNode {
                            key: s.key.clone(),
                            val: new_child,
                            flags: s.flags.clone(),
                        }))
                    };
                    Ok((value, new_node))
                } else {
                    Ok((None, node))
                }
            }
            Node::Full(f) => {
                let idx = path[pos] as usize;
                let (value, new_child) = self.get_rec(Rc::clone(&f.children[idx]), key, path, pos + 1)?;
                let new_node = if Rc::ptr_eq(&new_child, &f.children[idx]) {
                    Rc::clone(&node)
                } else {
                    let mut children = f.children.clone();
                    children[idx] = new_child;
                    Rc::new(Node::Full(Box::new(FullNode {
                        children,
                        flags: f.flags.clone(),
                    })))
                };
                Ok((value, new_node))
            }
            Node::Hash(d) => {
                let resolved = Rc::new(self.resolve_hash(d, key, pos)?);
                self.get_rec(resolved, key, path, pos)
            }
        }
    }

    /// Inserts `value` at `key`, rewriting the tree along the way.
    pub fn insert(&mut self, key: &[u8], value: Bytes) -> Result<(), TrieError> {
        let path = key_path(key);
        let value_node = Rc::new(Node::Value(value));
        let root = Rc::clone(&self.root);
        let (_, new_root) = self.insert_rec(root, key, &path, 0, value_node)?;
        self.root = new_root;
        Ok(())
    }

    fn insert_rec(
        &mut self,
        node: Rc<Node>,
        key: &[u8],
        path: &[u8],
        pos: usize,
        value: Rc<Node>,
    ) -> Result<(bool, Rc<Node>), TrieError> {
        if pos == path.len() {
            return Ok(match (node.as_ref(), value.as_ref()) {
                (Node::Value(old), Node::Value(new_v)) if old == new_v => (false, node),
                _ => (true, value),
            });
        }
        match node.as_ref() {
            Node::Null => Ok((true, leaf_or_short(&path[pos..], value))),
            Node::Short(s) => {
                let ml = nibble::prefix_len(path, pos, &s.key);
                if ml == s.key.len() {
                    let (changed, new_child) = self.insert_rec(Rc::clone(&s.val), key, path, pos + ml, value)?;
                    if !changed {
                        return Ok((false, node));
                    }
                    Ok((
                        true,
                        Rc::new(Node::Short(ShortNode {
                            key: s.key.clone(),
                            val: new_child,
                            flags: Flags::default(),
                        })),
                    ))
                } else {
                    let diverge_existing = s.key[ml];
                    let diverge_incoming = path[pos + ml];
                    let mut branch = FullNode::empty();
                    branch.children[diverge_existing as usize] =
                        leaf_or_short(&s.key[ml + 1..], Rc::clone(&s.val));
                    branch.children[diverge_incoming as usize] =
                        leaf_or_short(&path[pos + ml + 1..], value);
                    let branch_node = Rc::new(Node::new_full(branch));
                    let result = if ml == 0 {
                        branch_node
                    } else {
                        Rc::new(Node::new_short(path[pos..pos + ml].to_vec(), branch_node))
                    };
                    Ok((true, result))
                }
            }
            Node::Full(f) => {
                let idx = path[pos] as usize;
                let (changed, new_child) = self.insert_rec(Rc::clone(&f.children[idx]), key, path, pos + 1, value)?;
                if !changed {
                    return Ok((false, node));
                }
                let mut children = f.children.clone();
                children[idx] = new_child;
                Ok((
                    true,
                    Rc::new(Node::Full(Box::new(FullNode {
                        children,
                        flags: Flags::default(),
                    }))),
                ))
            }
            Node::Hash(d) => {
                let resolved = Rc::new(self.resolve_hash(d, key, pos)?);
                self.insert_rec(resolved, key, path, pos, value)
            }
            Node::Value(_) => unreachable!("a Value node is only ever reached at pos == path.len()"),
        }
    }

    /// Removes `key`, returning whether it was present. Collapses any Full left with a single
    /// child back into a Short.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool, TrieError> {
        let path = key_path(key);
        let root = Rc::clone(&self.root);
        let (found, new_root) = self.remove_rec(root, key, &path, 0)?;
        if found {
            self.root = new_root;
        }
        Ok(found)
    }

    fn remove_rec(
        &mut self,
        node: Rc<Node>,
        key: &[u8],
        path: &[u8],
        pos: usize,
    ) -> Result<(bool, Rc<Node>), TrieError> {
        match node.as_ref() {
            Node::Null => Ok((false, node)),
            Node::Value(_) => Ok((true, Rc::new(Node::Null))),
            Node::Short(s) => {
                let ml = nibble::prefix_len(path, pos, &s.key);
                if ml < s.key.len() {
                    return Ok((false, node));
                }
                if pos + ml == path.len() {
                    return Ok((true, Rc::new(Node::Null)));
                }
                let (changed, new_child) = self.remove_rec(Rc::clone(&s.val), key, path, pos + ml)?;
                if !changed {
                    return Ok((false, node));
                }
                let merged = match new_child.as_ref() {
                    Node::Short(nn) => Rc::new(Node::new_short(
                        nibble::concat(&s.key, &nn.key),
                        Rc::clone(&nn.val),
                    )),
                    _ => Rc::new(Node::new_short(s.key.clone(), new_child)),
                };
                Ok((true, merged))
            }
            Node::Full(f) => {
                let idx = path[pos] as usize;
                let (changed, new_child) = self.remove_rec(Rc::clone(&f.children[idx]), key, path, pos + 1)?;
                if !changed {
                    return Ok((false, node));
                }
                let mut children = f.children.clone();
                children[idx] = new_child;

                let mut only = None;
                let mut ambiguous = false;
                for (i, c) in children.iter().enumerate() {
                    if !c.is_null() {
                        if only.is_some() {
                            ambiguous = true;
                            break;
                        }
                        only = Some(i);
                    }
                }
                if !ambiguous {
                    if let Some(i) = only {
                        if i == 16 {
                            return Ok((
                                true,
                                Rc::new(Node::new_short(vec![TERMINATOR], Rc::clone(&children[16]))),
                            ));
                        }
                        let resolved = self.resolve_for_collapse(&children[i], key, pos + 1)?;
                        if let Node::Short(cs) = resolved.as_ref() {
                            let merged_key = nibble::concat(&[i as u8], &cs.key);
                            return Ok((true, Rc::new(Node::new_short(merged_key, Rc::clone(&cs.val)))));
                        }
                        return Ok((true, Rc::new(Node::new_short(vec![i as u8], Rc::clone(&children[i])))));
                    }
                }
                Ok((
                    true,
                    Rc::new(Node::Full(Box::new(FullNode {
                        children,
                        flags: Flags::default(),
                    }))),
                ))
            }
            Node::Hash(d) => {
                let resolved = Rc::new(self.resolve_hash(d, key, pos)?);
                self.remove_rec(resolved, key, path, pos)
            }
        }
    }

    fn resolve_for_collapse(&self, child: &Rc<Node>, key: &[u8], pos: usize) -> Result<Rc<Node>, TrieError> {
        match child.as_ref() {
            Node::Hash(d) => Ok(Rc::new(self.resolve_hash(d, key, pos)?)),
            _ => Ok(Rc::clone(child)),
        }
    }

    /// Fetches and decodes the node at `digest`.
    fn resolve_hash(&self, digest: &Digest, key: &[u8], pos: usize) -> Result<Node, TrieError> {
        let store = self.store.as_ref().ok_or(TrieError::NoDatabase)?;
        let bytes = store
            .get(digest.as_bytes())
            .map_err(store_err)?
            .ok_or_else(|| TrieError::MissingNode {
                root_hash: self.original_root.clone(),
                node_hash: digest.clone(),
                key: key.to_vec(),
                pos,
            })?;
        codec::decode(&bytes)
    }

    /// Hashes the in-memory tree without persisting anything, swaps in the cached-hashed tree,
    /// and returns the root digest.
    pub fn root_hash(&mut self) -> Digest {
        let mut th = TreeHasher::new(self.hasher.as_ref(), None, self.cache_gen, self.cache_limit);
        let (digest, cached) = th.hash_root(&self.root);
        self.root = cached;
        digest
    }

    /// Hashes the tree, writes every node touched along the way plus the [`STATE_KEY`] entry to
    /// the store in one atomic batch, and advances the cache generation.
    pub fn commit(&mut self) -> Result<Digest, TrieError> {
        let store = self.store.clone().ok_or(TrieError::NoDatabase)?;
        let mut batch = Batch::new();
        let digest = {
            let mut th = TreeHasher::new(self.hasher.as_ref(), Some(&mut batch), self.cache_gen, self.cache_limit);
            let (digest, cached) = th.hash_root(&self.root);
            self.root = cached;
            digest
        };
        batch.put(vec![STATE_KEY], Bytes::from(digest.as_bytes().to_vec()));
        store.write_batch(batch).map_err(store_err)?;
        debug!(root = %digest, "committed trie");
        self.original_root = digest.clone();
        self.cache_gen += 1;
        Ok(digest)
    }

    /// Resets in-memory state to `root` (or the empty root if absent), without checking the
    /// store for its existence.
    pub fn inject(&mut self, root: Option<Digest>) -> Result<(), TrieError> {
        let root_digest = root.unwrap_or_else(|| self.empty_root.clone());
        if root_digest.len() != self.hasher.size() {
            return Err(TrieError::InvalidRoot {
                expected_len: self.hasher.size(),
                actual_len: root_digest.len(),
            });
        }
        self.root = if root_digest == self.empty_root {
            Rc::new(Node::Null)
        } else {
            Rc::new(Node::Hash(root_digest.clone()))
        };
        self.original_root = root_digest;
        Ok(())
    }

    /// Builds a fresh trie sharing this trie's store, injected at `root`.
    /// The snapshot shares no in-memory nodes with its parent: mutating it never touches the
    /// parent's `root`.
    pub fn snapshot(&self, root: Option<Digest>) -> Result<Trie<H>, TrieError> {
        let store = self.store.clone().ok_or(TrieError::NoDatabase)?;
        let mut snap = Trie {
            store: Some(store),
            hasher: Rc::clone(&self.hasher),
            root: Rc::new(Node::Null),
            original_root: self.empty_root.clone(),
            empty_root: self.empty_root.clone(),
            cache_gen: 0,
            cache_limit: self.cache_limit,
        };
        snap.inject(root)?;
        Ok(snap)
    }
}
