//! Core consensus-state types: addresses, digests, and the compact form.
//!
//! All table content is keyed by raw bytes derived from [`Address`] values;
//! every table summarizes its content as a [`Hash256`] digest, and the five
//! digests together form the [`DposRoots`] compact form embedded in block
//! headers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte digest value.
///
/// Used for state-table roots (BLAKE3) and the aggregate consensus root.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero digest (32 zero bytes). The root of an empty table.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero digest.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte account identifier.
///
/// Serves as key material in the candidate, delegate, vote, and mint-count
/// tables and as the payload of candidate and vote relations.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Create an Address from a byte array.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compact form of the DPoS state aggregate: the five table digests.
///
/// Carries no reference to live tables, so it can be embedded in a block
/// header, transmitted, and later used to reconstruct an aggregate against
/// the same backing database. Every field is required; a header missing any
/// one of them does not deserialize.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DposRoots {
    /// Root of the epoch table (validator set).
    #[serde(rename = "epochRoot")]
    pub epoch: Hash256,
    /// Root of the delegate table (candidate → delegator edges).
    #[serde(rename = "delegateRoot")]
    pub delegate: Hash256,
    /// Root of the candidate table (membership).
    #[serde(rename = "candidateRoot")]
    pub candidate: Hash256,
    /// Root of the vote table (delegator → candidate).
    #[serde(rename = "voteRoot")]
    pub vote: Hash256,
    /// Root of the mint-count table.
    #[serde(rename = "mintCntRoot")]
    pub mint_cnt: Hash256,
}

impl DposRoots {
    /// Aggregate consensus root: `BLAKE3(epoch ‖ delegate ‖ candidate ‖
    /// vote ‖ mint_cnt)`, field order fixed by the protocol.
    ///
    /// Changes iff at least one table digest changed.
    pub fn root(&self) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.epoch.as_bytes());
        hasher.update(self.delegate.as_bytes());
        hasher.update(self.candidate.as_bytes());
        hasher.update(self.vote.as_bytes());
        hasher.update(self.mint_cnt.as_bytes());
        Hash256(hasher.finalize().into())
    }
}
