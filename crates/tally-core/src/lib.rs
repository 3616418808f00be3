//! # tally-core
//! Consensus-state container for the Tally DPoS protocol.
//!
//! Five authenticated key-value tables (epoch, delegate, vote, candidate,
//! mint-count) composed into one versioned aggregate, [`dpos::DposState`].
//! Block execution takes a snapshot, applies delegation and candidacy
//! operations, and either commits the aggregate (obtaining the five-digest
//! [`types::DposRoots`] for the block header) or reverts to the snapshot.

pub mod dpos;
pub mod error;
pub mod table;
pub mod types;
