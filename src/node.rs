// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The node algebra: a tagged sum of four variants plus the hash-cache flags
//! carried by the two branch-shaped variants.
//!
//! Mutation never happens in place: `clone()` on a [`ShortNode`]/[`FullNode`] is a shallow copy
//! that shares its children via [`Rc`], so an uncommitted mutation never disturbs nodes reachable
//! from a trie's `originalRoot`. This crate is single-threaded by design, so `Rc` rather than
//! `Arc` is the right sharing primitive.

use crate::hash::Digest;
use crate::nibble::{Nibbles, TERMINATOR};
use bytes::Bytes;
use std::rc::Rc;

/// Hash-cache metadata carried by [`ShortNode`] and [`FullNode`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Flags {
    /// The node's digest, cached while `dirty` is false and `gen` is within `cacheLimit`.
    pub hash: Option<Digest>,
    /// Set whenever the node is rebuilt by an insert/remove rewrite.
    pub dirty: bool,
    /// The commit generation in which `hash` was computed.
    pub gen: u64,
}

impl Flags {
    fn fresh_dirty() -> Self {
        Flags {
            hash: None,
            dirty: true,
            gen: 0,
        }
    }
}

/// A path-compression node carrying a shared nibble prefix and a single child.
///
/// The child is a [`Node::Value`] iff the last nibble of `key` is [`TERMINATOR`] (then this node
/// is a *leaf*); otherwise the child is a [`Node::Full`] or [`Node::Hash`] and this node is an
/// *extension*.
#[derive(Clone, Debug)]
pub(crate) struct ShortNode {
    pub key: Nibbles,
    pub val: Rc<Node>,
    pub flags: Flags,
}

impl ShortNode {
    pub fn new(key: Nibbles, val: Rc<Node>) -> Self {
        assert!(!key.is_empty(), "a Short node's key must be non-empty");
        ShortNode {
            key,
            val,
            flags: Flags::fresh_dirty(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.key.last() == Some(&TERMINATOR)
    }
}

/// A 17-slot branch: 16 nibble-indexed children plus a value slot at index 16.
#[derive(Clone, Debug)]
pub(crate) struct FullNode {
    pub children: [Rc<Node>; 17],
    pub flags: Flags,
}

impl FullNode {
    pub fn empty() -> Self {
        FullNode {
            children: std::array::from_fn(|_| Rc::new(Node::Null)),
            flags: Flags::fresh_dirty(),
        }
    }

    /// Index of the single non-Null child, if exactly one exists.
    pub fn only_child(&self) -> Option<usize> {
        let mut found = None;
        for (i, child) in self.children.iter().enumerate() {
            if !child.is_null() {
                if found.is_some() {
                    return None;
                }
                found = Some(i);
            }
        }
        found
    }
}

/// The concrete node type of the trie.
#[derive(Clone, Debug)]
pub(crate) enum Node {
    /// The empty subtree.
    Null,
    /// A path-compression node; see [`ShortNode`].
    Short(ShortNode),
    /// A 17-slot branch; see [`FullNode`].
    Full(Box<FullNode>),
    /// An opaque user value.
    Value(Bytes),
    /// A placeholder standing in for a subtree known only by digest.
    Hash(Digest),
}

impl Node {
    pub fn new_short(key: Nibbles, val: Rc<Node>) -> Self {
        Node::Short(ShortNode::new(key, val))
    }

    pub fn new_full(full: FullNode) -> Self {
        Node::Full(Box::new(full))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn is_hash(&self) -> bool {
        matches!(self, Node::Hash(_))
    }

    pub fn is_short(&self) -> bool {
        matches!(self, Node::Short(_))
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Node::Full(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Node::Value(_))
    }

    /// True for a [`Node::Short`] whose child is a [`Node::Value`].
    pub fn is_leaf(&self) -> bool {
        match self {
            Node::Short(s) => s.is_leaf(),
            _ => false,
        }
    }

    pub(crate) fn flags(&self) -> Option<&Flags> {
        match self {
            Node::Short(s) => Some(&s.flags),
            Node::Full(f) => Some(&f.flags),
            _ => None,
        }
    }

    pub(crate) fn with_flags(&self, flags: Flags) -> Node {
        match self {
            Node::Short(s) => Node::Short(ShortNode {
                key: s.key.clone(),
                val: Rc::clone(&s.val),
                flags,
            }),
            Node::Full(f) => Node::Full(Box::new(FullNode {
                children: f.children.clone(),
                flags,
            })),
            other => other.clone(),
        }
    }
}
