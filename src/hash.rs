// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The `Hash` collaborator: a deterministic, collision-resistant digest function plus
//! the digest type it produces. The core only depends on this trait; [`Keccak256`] is supplied as
//! a concrete default so the crate is usable without pulling in an external hash implementation.

use bytes::Bytes;
use sha3::{Digest as _, Keccak256 as Sha3Keccak256};
use std::fmt;

/// A node or key digest, as produced by a [`Hasher`]. Stored as a variable-length byte string so
/// the core stays agnostic to any particular digest width.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Digest(Bytes);

impl Digest {
    pub fn new(bytes: Vec<u8>) -> Self {
        Digest(Bytes::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Digest {
    fn from(bytes: Vec<u8>) -> Self {
        Digest::new(bytes)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// Digests round-trip through serde as `0x`-prefixed hex, matching [`fmt::Display`], rather than
/// as a raw byte array, so they stay readable in JSON config/test fixtures.
impl serde::Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)?;
        Ok(Digest::new(bytes))
    }
}

/// The `Hash` collaborator: a deterministic digest function of a known output width.
///
/// Implementations must be deterministic and collision-resistant; the authenticity of the whole
/// trie rests on this. `size()` drives the Hasher's inline-vs-hash decision.
pub trait Hasher {
    /// Width, in bytes, of every digest this hasher produces.
    fn size(&self) -> usize;

    /// Computes the digest of `data`.
    fn digest(&self, data: &[u8]) -> Digest;
}

/// The default `Hasher`: Keccak-256, as used by every Ethereum-style Merkle-Patricia trie in
/// production (go-ethereum, reth, openethereum, ...).
#[derive(Clone, Copy, Debug, Default)]
pub struct Keccak256;

impl Hasher for Keccak256 {
    fn size(&self) -> usize {
        32
    }

    fn digest(&self, data: &[u8]) -> Digest {
        let mut hasher = Sha3Keccak256::new();
        hasher.update(data);
        Digest::new(hasher.finalize().to_vec())
    }
}
