// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The `Codec` collaborator: a canonical, isomorphic `encode`/`decode` pair over
//! [`Node`].
//!
//! The wire shape is RLP (a length-prefixed list encoding of byte strings and nested lists) — the
//! same choice every production Ethereum-style Merkle-Patricia trie makes. A [`ShortNode`]'s key
//! is hex-prefix (HP) encoded: the high nibble of the first encoded byte packs a leaf/extension
//! flag and an odd/even-length flag, so the terminator and parity survive the encode/decode
//! round-trip without a side channel.

use crate::error::TrieError;
use crate::hash::Digest;
use crate::nibble::TERMINATOR;
use crate::node::{FullNode, Node, ShortNode};
use bytes::Bytes;
use rlp::{Rlp, RlpStream};
use std::rc::Rc;

/// Encodes `node` to its canonical byte representation.
///
/// Children of [`Node::Short`]/[`Node::Full`] must already have been reduced to their
/// inline-or-[`Node::Hash`] form by the [`crate::hasher`] before this is called — `encode` itself
/// never decides inline-vs-hash, it only serializes whatever it is given.
pub(crate) fn encode(node: &Node) -> Bytes {
    match node {
        Node::Null => Bytes::from_static(&[0xc0]),
        Node::Value(v) => Bytes::from(rlp::encode(v.as_ref())),
        Node::Hash(d) => Bytes::from(rlp::encode(d.as_bytes())),
        Node::Short(s) => {
            let mut stream = RlpStream::new_list(2);
            let key_bytes = hp_encode(&s.key);
            stream.append(&key_bytes);
            encode_child_into(&mut stream, &s.val);
            Bytes::from(stream.out().to_vec())
        }
        Node::Full(f) => {
            let mut stream = RlpStream::new_list(17);
            for child in f.children.iter() {
                encode_child_into(&mut stream, child);
            }
            Bytes::from(stream.out().to_vec())
        }
    }
}

fn encode_child_into(stream: &mut RlpStream, child: &Node) {
    match child {
        Node::Null => {
            stream.append_empty_data();
        }
        Node::Hash(d) => {
            stream.append(&d.as_bytes());
        }
        Node::Value(v) => {
            stream.append(&v.as_ref());
        }
        Node::Short(_) | Node::Full(_) => {
            // Inlined: the child's encoding was short enough that the Hasher chose not to
            // replace it with a Hash placeholder. Nest it directly as a sub-list.
            let encoded = encode(child);
            stream.append_raw(&encoded, 1);
        }
    }
}

/// Decodes `bytes` (as read from the store at digest `at`) back into a [`Node`].
///
/// Only [`Node::Short`] and [`Node::Full`] are ever independently persisted — [`Node::Value`] and
/// [`Node::Hash`] only ever occur nested inside one of those two, so this never attempts to
/// produce them at the top level.
pub(crate) fn decode(bytes: &[u8]) -> Result<Node, TrieError> {
    let rlp = Rlp::new(bytes);
    if !rlp.is_list() {
        return Err(TrieError::InvalidNode(
            "top-level node encoding must be an RLP list".to_string(),
        ));
    }
    match rlp.item_count().map_err(rlp_err)? {
        2 => decode_short(&rlp),
        17 => decode_full(&rlp),
        n => Err(TrieError::InvalidNode(format!(
            "node list has {n} items, expected 2 (short) or 17 (full)"
        ))),
    }
}

fn decode_short(rlp: &Rlp) -> Result<Node, TrieError> {
    let key_bytes: Vec<u8> = rlp.val_at(0).map_err(rlp_err)?;
    let (nibbles, is_leaf) = hp_decode(&key_bytes)?;
    let child_rlp = rlp.at(1).map_err(rlp_err)?;
    let val = if is_leaf {
        let data: Vec<u8> = child_rlp.data().map_err(rlp_err)?.to_vec();
        Rc::new(Node::Value(Bytes::from(data)))
    } else {
        Rc::new(decode_child(&child_rlp)?)
    };
    Ok(Node::new_short(nibbles, val))
}

fn decode_full(rlp: &Rlp) -> Result<Node, TrieError> {
    let mut full = FullNode::empty();
    for i in 0..16 {
        let child_rlp = rlp.at(i).map_err(rlp_err)?;
        full.children[i] = Rc::new(decode_child(&child_rlp)?);
    }
    let value_rlp = rlp.at(16).map_err(rlp_err)?;
    full.children[16] = if value_rlp.is_empty() {
        Rc::new(Node::Null)
    } else {
        let data: Vec<u8> = value_rlp.data().map_err(rlp_err)?.to_vec();
        Rc::new(Node::Value(Bytes::from(data)))
    };
    Ok(Node::new_full(full))
}

/// Decodes a single branch/extension slot: empty string -> Null, 32-ish-byte string -> Hash,
/// nested list -> an inlined Short/Full node decoded recursively.
fn decode_child(rlp: &Rlp) -> Result<Node, TrieError> {
    if rlp.is_list() {
        return decode(rlp.as_raw());
    }
    let data: Vec<u8> = rlp.data().map_err(rlp_err)?.to_vec();
    if data.is_empty() {
        Ok(Node::Null)
    } else {
        Ok(Node::Hash(Digest::new(data)))
    }
}

fn rlp_err(e: rlp::DecoderError) -> TrieError {
    TrieError::InvalidNode(e.to_string())
}

/// Hex-prefix encodes a nibble sequence, packing the leaf flag and the odd-length flag into the
/// high nibble of the first output byte.
fn hp_encode(nibbles: &[u8]) -> Vec<u8> {
    let is_leaf = nibbles.last() == Some(&TERMINATOR);
    let path = if is_leaf {
        &nibbles[..nibbles.len() - 1]
    } else {
        nibbles
    };
    let odd = path.len() % 2 == 1;
    let flag = (((is_leaf as u8) << 1) | (odd as u8)) << 4;

    let mut out = Vec::with_capacity(path.len() / 2 + 1);
    if odd {
        out.push(flag | path[0]);
        let mut chunks = path[1..].chunks_exact(2);
        for pair in &mut chunks {
            out.push((pair[0] << 4) | pair[1]);
        }
    } else {
        out.push(flag);
        let mut chunks = path.chunks_exact(2);
        for pair in &mut chunks {
            out.push((pair[0] << 4) | pair[1]);
        }
    }
    out
}

/// Inverse of [`hp_encode`]: returns the nibble path (with the terminator re-appended when the
/// leaf flag is set) and whether the leaf flag was set.
fn hp_decode(data: &[u8]) -> Result<(Vec<u8>, bool), TrieError> {
    let first = *data
        .first()
        .ok_or_else(|| TrieError::InvalidNode("empty hex-prefix key".to_string()))?;
    let is_leaf = (first & 0x20) != 0;
    let odd = (first & 0x10) != 0;

    let mut nibbles = Vec::with_capacity(data.len() * 2);
    if odd {
        nibbles.push(first & 0x0f);
    }
    for &byte in &data[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    if is_leaf {
        nibbles.push(TERMINATOR);
    }
    Ok((nibbles, is_leaf))
}
