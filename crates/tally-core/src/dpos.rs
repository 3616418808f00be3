//! The DPoS state aggregate and its domain operations.
//!
//! [`DposState`] owns five authenticated tables — epoch, delegate, vote,
//! candidate, mint-count — and keeps them mutually consistent through the
//! candidacy, delegation, and validator-set operations. It is mutated in
//! place during block execution; [`snapshot`](DposState::snapshot) and
//! [`revert_to_snapshot`](DposState::revert_to_snapshot) give block
//! execution transactional semantics, and
//! [`commit_to`](DposState::commit_to) persists all five tables and yields
//! the [`DposRoots`] compact form for the block header.
//!
//! Cross-table invariants maintained here:
//! - a delegation edge exists iff the delegator's vote points at that
//!   candidate;
//! - a vote may only reference a registered candidate;
//! - removing a candidate cascades to its delegation edges and votes.
//!
//! Designed for single-writer, sequential use: no internal locking.
//! Several aggregates may share one backing database, since tables opened
//! at different digests never alias each other's in-memory changes.

use std::fmt;
use std::sync::Arc;

use crate::error::{DposError, StoreError};
use crate::table::{StateTable, TableStore};
use crate::types::{Address, DposRoots, Hash256};

// Per-table namespace tags. Equal contents in different tables must commit
// to different digests.
const EPOCH_TAG: &[u8] = b"epoch-";
const DELEGATE_TAG: &[u8] = b"delegate-";
const VOTE_TAG: &[u8] = b"vote-";
const CANDIDATE_TAG: &[u8] = b"candidate-";
const MINT_CNT_TAG: &[u8] = b"mintCnt-";

/// Well-known epoch-table key holding the encoded validator set.
const VALIDATOR_SET_KEY: &[u8] = b"validators";

/// Mint-count table key: epoch index (big-endian) followed by the
/// validator address, so one epoch's counters form a contiguous key range.
pub fn mint_cnt_key(epoch: u64, validator: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 20);
    key.extend_from_slice(&epoch.to_be_bytes());
    key.extend_from_slice(validator.as_bytes());
    key
}

/// Delegate-table key: candidate followed by delegator, so one candidate's
/// delegators form a contiguous key range for prefix scans.
fn delegate_key(candidate: &Address, delegator: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(candidate.as_bytes());
    key.extend_from_slice(delegator.as_bytes());
    key
}

/// Commit a table's in-memory changes and flush them to the backing
/// database, returning the post-commit digest.
fn commit_table(table: &mut StateTable) -> Result<Hash256, StoreError> {
    let root = table.commit()?;
    table.flush()?;
    Ok(root)
}

/// The versioned DPoS state aggregate.
///
/// Exclusive owner of its five table handles; holds a shared handle to the
/// backing database only so snapshots and reconstructions can reopen tables
/// against the same storage.
#[derive(Clone)]
pub struct DposState {
    epoch: StateTable,
    delegate: StateTable,
    vote: StateTable,
    candidate: StateTable,
    mint_cnt: StateTable,
    backend: Arc<dyn TableStore>,
}

impl fmt::Debug for DposState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DposState")
            .field("epoch", &self.epoch)
            .field("delegate", &self.delegate)
            .field("vote", &self.vote)
            .field("candidate", &self.candidate)
            .field("mint_cnt", &self.mint_cnt)
            .finish_non_exhaustive()
    }
}

impl DposState {
    /// Fresh aggregate: all five tables empty, root digests zero.
    pub fn new(backend: Arc<dyn TableStore>) -> Self {
        Self {
            epoch: StateTable::empty(backend.clone(), EPOCH_TAG),
            delegate: StateTable::empty(backend.clone(), DELEGATE_TAG),
            vote: StateTable::empty(backend.clone(), VOTE_TAG),
            candidate: StateTable::empty(backend.clone(), CANDIDATE_TAG),
            mint_cnt: StateTable::empty(backend.clone(), MINT_CNT_TAG),
            backend,
        }
    }

    /// Reconstruct an aggregate from a previously committed compact form.
    ///
    /// Each table is reopened at its recorded digest against `backend`.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingData`] if the backend lacks the content for any
    /// of the five digests — distinct from ordinary per-key absence.
    pub fn from_roots(backend: Arc<dyn TableStore>, roots: &DposRoots) -> Result<Self, StoreError> {
        Ok(Self {
            epoch: StateTable::open_at(backend.clone(), EPOCH_TAG, roots.epoch)?,
            delegate: StateTable::open_at(backend.clone(), DELEGATE_TAG, roots.delegate)?,
            vote: StateTable::open_at(backend.clone(), VOTE_TAG, roots.vote)?,
            candidate: StateTable::open_at(backend.clone(), CANDIDATE_TAG, roots.candidate)?,
            mint_cnt: StateTable::open_at(backend.clone(), MINT_CNT_TAG, roots.mint_cnt)?,
            backend,
        })
    }

    /// Reopen all five tables of this aggregate at the digests recorded in
    /// `roots`, discarding current in-memory state.
    ///
    /// The aggregate is left untouched if any table fails to open.
    pub fn reset_to_roots(&mut self, roots: &DposRoots) -> Result<(), StoreError> {
        let reopened = Self::from_roots(self.backend.clone(), roots)?;
        *self = reopened;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Candidacy
    // ------------------------------------------------------------------

    /// Register `addr` as a candidate. Idempotent; no side effects on other
    /// tables.
    pub fn become_candidate(&mut self, addr: Address) -> Result<(), DposError> {
        self.candidate
            .insert(addr.as_bytes(), addr.as_bytes().to_vec())?;
        Ok(())
    }

    /// Remove `addr` from the candidate set and cascade the removal to all
    /// of its delegation edges and the votes still pointing at it.
    ///
    /// Absent entries are tolerated at every step; any other store error
    /// aborts the cascade and propagates. A failed cascade leaves the
    /// in-memory aggregate partially mutated — the caller must revert to a
    /// prior snapshot rather than continue.
    pub fn kickout_candidate(&mut self, addr: Address) -> Result<(), DposError> {
        self.candidate.remove(addr.as_bytes())?;
        for (edge_key, delegator) in self.delegate.iter_prefix(addr.as_bytes()) {
            self.delegate.remove(&edge_key)?;
            if let Some(vote) = self.vote.get(&delegator)? {
                // A delegator that has since re-delegated keeps its vote.
                if vote == addr.0 {
                    self.vote.remove(&delegator)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delegation
    // ------------------------------------------------------------------

    /// Point `delegator`'s vote at `candidate`.
    ///
    /// A delegator holds at most one vote: any previous delegation edge is
    /// removed before the new edge and vote entry are written. Removal of
    /// the stale edge uses the same error policy as every other mutation —
    /// a missing edge is tolerated, a store failure propagates.
    ///
    /// # Errors
    ///
    /// [`DposError::InvalidCandidate`] if `candidate` is not registered.
    pub fn delegate(&mut self, delegator: Address, candidate: Address) -> Result<(), DposError> {
        if !self.candidate.contains(candidate.as_bytes())? {
            return Err(DposError::InvalidCandidate(candidate));
        }

        if let Some(old_candidate) = self.vote.get(delegator.as_bytes())? {
            let mut stale_edge = old_candidate;
            stale_edge.extend_from_slice(delegator.as_bytes());
            self.delegate.remove(&stale_edge)?;
        }

        self.delegate.insert(
            &delegate_key(&candidate, &delegator),
            delegator.as_bytes().to_vec(),
        )?;
        self.vote
            .insert(delegator.as_bytes(), candidate.as_bytes().to_vec())?;
        Ok(())
    }

    /// Withdraw `delegator`'s vote from `candidate`, removing both the
    /// delegation edge and the vote entry.
    ///
    /// # Errors
    ///
    /// - [`DposError::InvalidCandidate`] if `candidate` is not registered
    /// - [`DposError::NoActiveVote`] if the delegator has no vote entry
    /// - [`DposError::CandidateMismatch`] if the recorded vote names a
    ///   different candidate
    pub fn undelegate(&mut self, delegator: Address, candidate: Address) -> Result<(), DposError> {
        if !self.candidate.contains(candidate.as_bytes())? {
            return Err(DposError::InvalidCandidate(candidate));
        }

        let recorded = self
            .vote
            .get(delegator.as_bytes())?
            .ok_or(DposError::NoActiveVote(delegator))?;
        let recorded = decode_address(&recorded)?;
        if recorded != candidate {
            return Err(DposError::CandidateMismatch {
                recorded,
                claimed: candidate,
            });
        }

        self.delegate.remove(&delegate_key(&candidate, &delegator))?;
        self.vote.remove(delegator.as_bytes())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Validator set
    // ------------------------------------------------------------------

    /// Store the ordered validator set for the current epoch under the
    /// well-known key, overwriting any prior value. No length or duplicate
    /// policy is enforced here — that belongs to the consensus engine.
    pub fn set_validators(&mut self, validators: &[Address]) -> Result<(), DposError> {
        let encoded = bincode::encode_to_vec(validators, bincode::config::standard())
            .map_err(|e| DposError::EncodeError(e.to_string()))?;
        self.epoch.insert(VALIDATOR_SET_KEY, encoded)?;
        Ok(())
    }

    /// Read the ordered validator set for the current epoch.
    ///
    /// A never-set epoch table yields the empty sequence.
    ///
    /// # Errors
    ///
    /// [`DposError::DecodeError`] if the stored bytes are malformed — a
    /// corruption signal that should not occur in a correctly written
    /// database.
    pub fn validators(&self) -> Result<Vec<Address>, DposError> {
        match self.epoch.get(VALIDATOR_SET_KEY)? {
            None => Ok(Vec::new()),
            Some(bytes) => {
                let (validators, _) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| DposError::DecodeError(e.to_string()))?;
                Ok(validators)
            }
        }
    }

    // ------------------------------------------------------------------
    // Snapshot / revert
    // ------------------------------------------------------------------

    /// Take an independent copy of the aggregate.
    ///
    /// The snapshot's five table handles are field-wise copies: mutating
    /// either aggregate never affects the other. There is no multi-level
    /// snapshot stack — callers wanting nested transactions keep their own
    /// stack of snapshots.
    pub fn snapshot(&self) -> DposState {
        self.clone()
    }

    /// Overwrite the five table handles with those captured in `snapshot`,
    /// discarding every in-memory mutation made since it was taken. Content
    /// already flushed to the backing database is unaffected.
    pub fn revert_to_snapshot(&mut self, snapshot: &DposState) {
        self.epoch = snapshot.epoch.clone();
        self.delegate = snapshot.delegate.clone();
        self.vote = snapshot.vote.clone();
        self.candidate = snapshot.candidate.clone();
        self.mint_cnt = snapshot.mint_cnt.clone();
    }

    // ------------------------------------------------------------------
    // Root & commit
    // ------------------------------------------------------------------

    /// The compact form of the current in-memory state: the five table
    /// digests, reflecting uncommitted mutations.
    pub fn roots(&self) -> DposRoots {
        DposRoots {
            epoch: self.epoch.root_hash(),
            delegate: self.delegate.root_hash(),
            candidate: self.candidate.root_hash(),
            vote: self.vote.root_hash(),
            mint_cnt: self.mint_cnt.root_hash(),
        }
    }

    /// Aggregate consensus root: a pure function of the five current table
    /// digests. Usable at any time, including on an uncommitted aggregate.
    pub fn root(&self) -> Hash256 {
        self.roots().root()
    }

    /// Commit and flush all five tables in fixed order: epoch, delegate,
    /// vote, candidate, mint-count. Returns the post-commit compact form.
    ///
    /// The first failing step aborts the whole commit: tables committed
    /// before it are left durably written, later ones are not. A failed
    /// commit therefore leaves the database possibly inconsistent across
    /// tables — the caller must discard the block and reprocess it from a
    /// pre-commit snapshot, not retry in place. The aggregate itself
    /// remains usable for the next block after a successful commit.
    pub fn commit_to(&mut self) -> Result<DposRoots, StoreError> {
        let epoch = commit_table(&mut self.epoch)?;
        let delegate = commit_table(&mut self.delegate)?;
        let vote = commit_table(&mut self.vote)?;
        let candidate = commit_table(&mut self.candidate)?;
        let mint_cnt = commit_table(&mut self.mint_cnt)?;
        Ok(DposRoots {
            epoch,
            delegate,
            candidate,
            vote,
            mint_cnt,
        })
    }

    // ------------------------------------------------------------------
    // Table access
    // ------------------------------------------------------------------

    /// Read access to the epoch table.
    pub fn epoch_table(&self) -> &StateTable {
        &self.epoch
    }

    /// Read access to the delegate table.
    pub fn delegate_table(&self) -> &StateTable {
        &self.delegate
    }

    /// Read access to the vote table.
    pub fn vote_table(&self) -> &StateTable {
        &self.vote
    }

    /// Read access to the candidate table.
    pub fn candidate_table(&self) -> &StateTable {
        &self.candidate
    }

    /// Read access to the mint-count table.
    pub fn mint_cnt_table(&self) -> &StateTable {
        &self.mint_cnt
    }

    /// Mutable access to the mint-count table. Mint bookkeeping is direct
    /// table access by [`mint_cnt_key`]: the consumer performs the
    /// read-increment-write and chooses the epoch index.
    pub fn mint_cnt_table_mut(&mut self) -> &mut StateTable {
        &mut self.mint_cnt
    }

    /// Handle to the backing database shared by the five tables.
    pub fn backend(&self) -> Arc<dyn TableStore> {
        self.backend.clone()
    }
}

/// Decode a stored 20-byte address value.
fn decode_address(bytes: &[u8]) -> Result<Address, DposError> {
    let bytes: [u8; 20] = bytes
        .try_into()
        .map_err(|_| DposError::DecodeError(format!("address entry of {} bytes", bytes.len())))?;
    Ok(Address(bytes))
}
