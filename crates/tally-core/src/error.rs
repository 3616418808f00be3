//! Error types for the Tally consensus state.
use thiserror::Error;

use crate::types::{Address, Hash256};

/// Failures in the authenticated-table and backing-database layer.
///
/// An absent key is never an error: lookups return `Ok(None)` and removals
/// `Ok(false)`. These variants cover the fatal conditions only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("missing data: no table content for root {0}")] MissingData(Hash256),
    #[error("corrupt table content: {0}")] Corrupt(String),
    #[error("backend: {0}")] Backend(String),
}

/// Failures of DPoS domain operations.
///
/// `InvalidCandidate`, `CandidateMismatch`, and `NoActiveVote` are
/// recoverable: the caller rejects the offending transaction. `EncodeError`
/// means a value could not be serialized for storage; `DecodeError` signals
/// a corrupt table entry. Store failures propagate unchanged; after any
/// error, the in-memory aggregate may be partially mutated and the caller
/// must revert to a prior snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DposError {
    #[error("invalid candidate: {0}")] InvalidCandidate(Address),
    #[error("candidate mismatch: vote records {recorded}, claimed {claimed}")] CandidateMismatch { recorded: Address, claimed: Address },
    #[error("no active vote for delegator {0}")] NoActiveVote(Address),
    #[error("failed to encode entry: {0}")] EncodeError(String),
    #[error("failed to decode stored entry: {0}")] DecodeError(String),
    #[error(transparent)] Store(#[from] StoreError),
}
