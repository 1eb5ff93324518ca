//! Per-(voter, poll) ballot state and its persistent store.
//!
//! A ballot is the only mutable record the core keeps between
//! operations. Its nonce discipline carries the protocol's
//! reverse-processing semantics, so the rules are strict:
//!
//! - `next_nonce` starts at 1 and only ever grows. It is advanced by
//!   the orchestrator *after* a publish succeeds — never before, and
//!   never rolled back once the ciphertext is on chain, even if the
//!   caller abandons the task afterwards.
//! - Votes and key changes share `next_nonce`. `key_change_nonce` is a
//!   separate display-only counter; it never reaches the wire.
//! - The bound public key is replaced only after a key-change publish
//!   succeeds.
//!
//! The store guards each ballot with a fail-fast in-flight set: two
//! concurrent operations on one ballot would race the shared counter,
//! so the second caller gets `ConcurrentModification` immediately.
//! Distinct ballots are independent.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::curve::Point;
use crate::error::{Error, Result};
use crate::store::StorageBackend;

/// Display summary of the most recent vote. Not security-critical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastVote {
    /// Chosen option.
    pub choice: u64,
    /// Weight placed on it.
    pub weight: u64,
    /// Quadratic cost (`weight²`).
    pub cost: u64,
}

/// Persistent per-(voter, poll) record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ballot {
    /// Next protocol nonce; `>= 1` always.
    pub next_nonce: u64,
    /// Currently bound voter public key; present once registered.
    #[serde(with = "crate::curve::point_serde::opt", default)]
    pub bound_public_key: Option<Point>,
    /// Position assigned by the registration log.
    pub state_index: Option<u64>,
    /// UI summary of the last successful vote.
    pub last_vote: Option<LastVote>,
    /// Display-only count of key changes.
    pub key_change_nonce: u64,
    /// Set when the poll has ended; terminal.
    #[serde(default)]
    pub finalized: bool,
}

impl Ballot {
    /// Fresh, unbound ballot.
    pub fn new() -> Self {
        Self {
            next_nonce: 1,
            bound_public_key: None,
            state_index: None,
            last_vote: None,
            key_change_nonce: 0,
            finalized: false,
        }
    }

    /// Whether registration has completed.
    pub fn is_bound(&self) -> bool {
        self.bound_public_key.is_some() && self.state_index.is_some()
    }

    /// Refuse operations on a finalized ballot.
    pub fn ensure_active(&self) -> Result<()> {
        if self.finalized {
            return Err(Error::VotingClosed);
        }
        Ok(())
    }

    /// Registration succeeded: bind the key and the assigned index.
    pub fn bind(&mut self, public_key: Point, state_index: u64) {
        self.bound_public_key = Some(public_key);
        self.state_index = Some(state_index);
    }

    /// A publish succeeded: advance the shared nonce and, for votes,
    /// refresh the display record.
    pub fn record_publish(&mut self, record: Option<LastVote>) {
        debug_assert!(self.next_nonce >= 1);
        self.next_nonce += 1;
        if record.is_some() {
            self.last_vote = record;
        }
    }

    /// A key-change publish succeeded: swap the active binding. The
    /// retired key is the secret store's business; the ballot keeps no
    /// trace of it.
    pub fn rebind(&mut self, new_public_key: Point) {
        self.bound_public_key = Some(new_public_key);
        self.key_change_nonce += 1;
    }

    /// External end-of-voting signal.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }
}

impl Default for Ballot {
    fn default() -> Self {
        Self::new()
    }
}

/// Primary key of a ballot record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BallotKey {
    /// Proposal (poll contract) address.
    pub proposal_address: String,
    /// Poll id within the deployment.
    pub poll_id: u64,
    /// Voter wallet address.
    pub voter_address: String,
}

impl BallotKey {
    /// Key for `(proposal, poll, voter)`.
    pub fn new(
        proposal_address: impl Into<String>,
        poll_id: u64,
        voter_address: impl Into<String>,
    ) -> Self {
        Self {
            proposal_address: proposal_address.into(),
            poll_id,
            voter_address: voter_address.into(),
        }
    }

    /// Stable storage key: `ballot:<proposal>:<poll_id>:<voter>`.
    pub fn storage_key(&self) -> String {
        format!(
            "ballot:{}:{}:{}",
            self.proposal_address, self.poll_id, self.voter_address
        )
    }

    /// Matching secret-store label for this ballot's voter key.
    pub fn secret_label(&self) -> String {
        format!(
            "secret:{}:{}:{}",
            self.proposal_address, self.poll_id, self.voter_address
        )
    }
}

/// Typed store over the persistent backend, plus the in-flight guard
/// set that serialises access per ballot.
pub struct BallotStore {
    backend: Arc<dyn StorageBackend>,
    in_flight: Mutex<HashSet<String>>,
}

impl BallotStore {
    /// Store over the given backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Claim exclusive access to one ballot. Fails fast with
    /// `ConcurrentModification` if another operation holds it; retrying
    /// is the caller's choice.
    pub fn begin(&self, key: &BallotKey) -> Result<BallotGuard<'_>> {
        let storage_key = key.storage_key();
        let mut held = self.in_flight.lock().expect("ballot guard set poisoned");
        if !held.insert(storage_key.clone()) {
            return Err(Error::ConcurrentModification);
        }
        Ok(BallotGuard {
            store: self,
            key: storage_key,
        })
    }

    /// Load a ballot. A record that fails to parse is discarded and
    /// reported absent — corruption must never surface as wrong state.
    pub fn load(&self, key: &BallotKey) -> Result<Option<Ballot>> {
        let storage_key = key.storage_key();
        let Some(raw) = self.backend.get(&storage_key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Ballot>(&raw) {
            Ok(ballot) => Ok(Some(ballot)),
            Err(err) => {
                tracing::warn!(key = %storage_key, %err, "discarding corrupt ballot record");
                self.backend.remove(&storage_key)?;
                Ok(None)
            }
        }
    }

    /// Persist a ballot.
    pub fn save(&self, key: &BallotKey, ballot: &Ballot) -> Result<()> {
        let json = serde_json::to_string(ballot)?;
        self.backend.put(&key.storage_key(), &json)
    }
}

/// RAII claim on one ballot; released on drop.
pub struct BallotGuard<'a> {
    store: &'a BallotStore,
    key: String,
}

impl Drop for BallotGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .store
            .in_flight
            .lock()
            .expect("ballot guard set poisoned");
        held.remove(&self.key);
    }
}
