//! The happy-path surface: one type that wires the pipeline together.
//!
//! `VotingClient` owns the stores, the crypto suite, and the publisher,
//! and sequences each operation so the protocol's ordering rules hold:
//!
//! - the ballot guard is claimed first, so a concurrent operation on
//!   the same ballot fails fast instead of racing the nonce;
//! - message assembly is pure and happens before any side effect, so a
//!   cancelled or failed call leaves no trace;
//! - the nonce increment (and, for key changes, the re-binding and
//!   secret rotation) happens strictly *after* the publisher accepts
//!   the message, and is persisted before the guard is released. A
//!   publisher failure therefore leaves the ballot byte-identical, and
//!   a retry may legitimately reuse the same nonce.

#![forbid(unsafe_code)]

use std::sync::Arc;

use num_bigint::BigUint;
use tracing::{info, warn};

use crate::ballot::{Ballot, BallotKey, BallotStore};
use crate::error::{Error, Result};
use crate::field::scalar_modulus;
use crate::keys::{Keypair, PrivateKey};
use crate::message::{self, BuiltMessage};
use crate::proposal::ProposalDescriptor;
use crate::publisher::{Publisher, TxReceipt};
use crate::store::{SecretStore, StorageBackend};
use crate::suite::CryptoSuite;

/// Client-side core for one voter identity store.
pub struct VotingClient<P: Publisher> {
    publisher: P,
    suite: Arc<dyn CryptoSuite>,
    ballots: BallotStore,
    secrets: SecretStore,
    backend: Arc<dyn StorageBackend>,
}

impl<P: Publisher> VotingClient<P> {
    /// Wire a client over one persistent backend (ballots and secrets
    /// share it) and one crypto suite.
    pub fn new(publisher: P, suite: Arc<dyn CryptoSuite>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            publisher,
            suite,
            ballots: BallotStore::new(backend.clone()),
            secrets: SecretStore::new(backend.clone()),
            backend,
        }
    }

    /// The wrapped publisher, for callers that need transport access.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Register `voter_address` for a poll: derive (or draw) the
    /// keypair, persist the secret, sign up on chain, and bind the
    /// assigned state index. Returns the state index.
    pub fn register(
        &self,
        proposal: &ProposalDescriptor,
        voter_address: &str,
        seed: Option<[u8; 32]>,
        gate_data: &[u8],
        credit_data: &[u8],
    ) -> Result<u64> {
        let key = self.ballot_key(proposal, voter_address);
        let _guard = self.ballots.begin(&key)?;

        let mut ballot = self.ballots.load(&key)?.unwrap_or_default();
        ballot.ensure_active()?;
        if ballot.is_bound() {
            return Err(Error::Domain("voter is already registered for this poll"));
        }

        let keypair = match seed {
            Some(seed) => Keypair::from_seed(seed),
            None => self.suite.generate_keypair(),
        };
        self.secrets
            .store(&key.secret_label(), &keypair.sk.to_bytes(), voter_address)?;

        let state_index =
            self.publisher
                .sign_up((keypair.pk.x, keypair.pk.y), gate_data, credit_data)?;

        ballot.bind(keypair.pk, state_index);
        self.ballots.save(&key, &ballot)?;
        info!(poll = %proposal.poll_address, voter = %voter_address, state_index, "registered voter");
        Ok(state_index)
    }

    /// Build, publish, and record one vote.
    pub fn vote(
        &self,
        proposal: &ProposalDescriptor,
        voter_address: &str,
        choice: u64,
        weight: u64,
    ) -> Result<TxReceipt> {
        let key = self.ballot_key(proposal, voter_address);
        let _guard = self.ballots.begin(&key)?;

        let ballot = self.require_ballot(&key)?;
        let sk = self.load_private_key(&key, voter_address)?;
        let built = message::build_vote_message(proposal, &sk, &ballot, choice, weight,
            self.suite.as_ref())?;

        self.publish_and_record(proposal, &key, ballot, built, voter_address)
    }

    /// Build, publish, and record a key change. The new secret replaces
    /// the active one only after the publish succeeds; the old secret
    /// is retired, not destroyed.
    pub fn change_key(
        &self,
        proposal: &ProposalDescriptor,
        voter_address: &str,
    ) -> Result<TxReceipt> {
        let key = self.ballot_key(proposal, voter_address);
        let _guard = self.ballots.begin(&key)?;

        let ballot = self.require_ballot(&key)?;
        let sk = self.load_private_key(&key, voter_address)?;
        let built =
            message::build_key_change_message(proposal, &sk, &ballot, self.suite.as_ref())?;

        self.publish_and_record(proposal, &key, ballot, built, voter_address)
    }

    /// Apply the external end-of-voting signal to a ballot.
    pub fn finalize(&self, proposal: &ProposalDescriptor, voter_address: &str) -> Result<()> {
        let key = self.ballot_key(proposal, voter_address);
        let _guard = self.ballots.begin(&key)?;
        let mut ballot = self.require_ballot(&key)?;
        ballot.finalize();
        self.ballots.save(&key, &ballot)?;
        info!(poll = %proposal.poll_address, voter = %voter_address, "ballot finalized");
        Ok(())
    }

    /// Read-only snapshot of a ballot, for display.
    pub fn ballot(
        &self,
        proposal: &ProposalDescriptor,
        voter_address: &str,
    ) -> Result<Option<Ballot>> {
        self.ballots.load(&self.ballot_key(proposal, voter_address))
    }

    /// Cache a proposal summary under `poll_cache:<poll>`. The cache is
    /// non-authoritative — a stale or corrupt entry is simply absent.
    pub fn cache_proposal(&self, proposal: &ProposalDescriptor) -> Result<()> {
        let key = format!("poll_cache:{}:{}", proposal.poll_address, proposal.poll_id);
        self.backend.put(&key, &serde_json::to_string(proposal)?)
    }

    /// Read a cached proposal summary back, if one parses.
    pub fn cached_proposal(
        &self,
        poll_address: &str,
        poll_id: u64,
    ) -> Result<Option<ProposalDescriptor>> {
        let key = format!("poll_cache:{poll_address}:{poll_id}");
        let Some(raw) = self.backend.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(proposal) => Ok(Some(proposal)),
            Err(err) => {
                warn!(key = %key, %err, "discarding corrupt poll cache entry");
                self.backend.remove(&key)?;
                Ok(None)
            }
        }
    }

    fn ballot_key(&self, proposal: &ProposalDescriptor, voter_address: &str) -> BallotKey {
        BallotKey::new(&proposal.poll_address, proposal.poll_id, voter_address)
    }

    fn require_ballot(&self, key: &BallotKey) -> Result<Ballot> {
        self.ballots
            .load(key)?
            .ok_or(Error::Domain("voter is not registered for this poll"))
    }

    /// Publish, then — and only then — mutate the ballot. The save
    /// happens while the guard is still held, so the increment is
    /// observable before anyone else can touch the record.
    fn publish_and_record(
        &self,
        proposal: &ProposalDescriptor,
        key: &BallotKey,
        mut ballot: Ballot,
        built: BuiltMessage,
        voter_address: &str,
    ) -> Result<TxReceipt> {
        let receipt = self
            .publisher
            .publish_message(&proposal.poll_address, &built.message)?;

        if let Some(new_keypair) = &built.new_keypair {
            let label = key.secret_label();
            let retired = format!("{label}#{}", ballot.key_change_nonce + 1);
            self.secrets.retire(&label, &retired)?;
            self.secrets
                .store(&label, &new_keypair.sk.to_bytes(), voter_address)?;
            ballot.rebind(new_keypair.pk);
            info!(poll = %proposal.poll_address, voter = %voter_address, "voter key rotated");
        }

        ballot.record_publish(built.record);
        self.ballots.save(key, &ballot)?;
        info!(
            poll = %proposal.poll_address,
            voter = %voter_address,
            nonce = ballot.next_nonce - 1,
            tx = %receipt.tx_hash,
            "message published"
        );
        Ok(receipt)
    }

    fn load_private_key(&self, key: &BallotKey, voter_address: &str) -> Result<PrivateKey> {
        let stored = self
            .secrets
            .load(&key.secret_label(), voter_address)?
            .ok_or(Error::Domain("voter secret key not found"))?;
        private_key_from_stored(&stored)
    }
}

/// Accept both the canonical 32-byte encoding and the legacy decimal
/// string form that older stores carried.
fn private_key_from_stored(stored: &[u8]) -> Result<PrivateKey> {
    if let Ok(bytes) = <[u8; 32]>::try_from(stored) {
        if let Ok(sk) = PrivateKey::from_bytes(&bytes) {
            return Ok(sk);
        }
    }
    let text = std::str::from_utf8(stored)
        .map_err(|_| Error::Serialization("stored secret is neither canonical nor text".into()))?;
    let value: BigUint = text
        .trim()
        .parse()
        .map_err(|_| Error::Serialization("stored secret is not a decimal scalar".into()))?;
    if value == BigUint::from(0u8) || value >= scalar_modulus() {
        warn!("stored legacy secret is out of range");
        return Err(Error::Serialization("legacy secret out of range".into()));
    }
    let mut bytes = [0u8; 32];
    let le = value.to_bytes_le();
    bytes[..le.len()].copy_from_slice(&le);
    PrivateKey::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;
    use crate::message::{open_message, verify_opened};
    use crate::publisher::MemoryPublisher;
    use crate::store::MemoryBackend;
    use crate::suite::{Bn254Suite, RngSource};

    const VOTER: &str = "0xvoter01";

    fn coordinator() -> Keypair {
        Keypair::from_seed([0x02; 32])
    }

    fn proposal() -> ProposalDescriptor {
        ProposalDescriptor::new("0xpoll", 0, coordinator().pk, 2, 35, 10, None).unwrap()
    }

    fn client() -> VotingClient<MemoryPublisher> {
        VotingClient::new(
            MemoryPublisher::new(),
            Arc::new(Bn254Suite::new(RngSource::Seeded([0x42; 32]))),
            Arc::new(MemoryBackend::new()),
        )
    }

    #[test]
    fn register_vote_and_decrypt_end_to_end() {
        let client = client();
        let proposal = proposal();
        let suite = Bn254Suite::new(RngSource::Seeded([0u8; 32]));

        let state_index = client
            .register(&proposal, VOTER, Some([0x01; 32]), &[], &[])
            .unwrap();
        assert_eq!(state_index, 1);

        client.vote(&proposal, VOTER, 1, 1).unwrap();

        let ballot = client.ballot(&proposal, VOTER).unwrap().unwrap();
        assert_eq!(ballot.next_nonce, 2);
        assert_eq!(ballot.last_vote.unwrap().cost, 1);

        // Coordinator side: the published message opens and verifies
        // against the registered key.
        let published = client.publisher().published();
        assert_eq!(published.len(), 1);
        let opened = open_message(&published[0].1, &coordinator().sk, &suite).unwrap();
        assert_eq!(opened.command.state_index, 1);
        assert_eq!(opened.command.vote_option_index, 1);
        assert_eq!(opened.command.nonce, 1);
        let voter_pk = Keypair::from_seed([0x01; 32]).pk;
        verify_opened(&opened, &voter_pk, &suite).unwrap();
    }

    #[test]
    fn voting_unregistered_is_refused() {
        let client = client();
        assert!(matches!(
            client.vote(&proposal(), VOTER, 0, 1),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn double_registration_is_refused() {
        let client = client();
        let proposal = proposal();
        client.register(&proposal, VOTER, None, &[], &[]).unwrap();
        assert!(matches!(
            client.register(&proposal, VOTER, None, &[], &[]),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn publisher_failure_leaves_the_nonce_alone() {
        let client = client();
        let proposal = proposal();
        client
            .register(&proposal, VOTER, Some([0x01; 32]), &[], &[])
            .unwrap();

        client.publisher().fail_next_publish("wallet rejected");
        assert!(matches!(
            client.vote(&proposal, VOTER, 1, 1),
            Err(Error::Publisher(_))
        ));
        let ballot = client.ballot(&proposal, VOTER).unwrap().unwrap();
        assert_eq!(ballot.next_nonce, 1, "nonce must not advance on failure");
        assert!(ballot.last_vote.is_none());

        // The retry reuses the same nonce and succeeds.
        client.vote(&proposal, VOTER, 1, 1).unwrap();
        let ballot = client.ballot(&proposal, VOTER).unwrap().unwrap();
        assert_eq!(ballot.next_nonce, 2);
    }

    #[test]
    fn key_change_rotates_the_secret_and_keeps_voting() {
        let client = client();
        let proposal = proposal();
        let suite = Bn254Suite::new(RngSource::Seeded([0u8; 32]));

        client
            .register(&proposal, VOTER, Some([0x01; 32]), &[], &[])
            .unwrap();
        let old_pk = Keypair::from_seed([0x01; 32]).pk;

        client.change_key(&proposal, VOTER).unwrap();
        let ballot = client.ballot(&proposal, VOTER).unwrap().unwrap();
        assert_eq!(ballot.next_nonce, 2);
        assert_eq!(ballot.key_change_nonce, 1);
        let new_pk = ballot.bound_public_key.unwrap();
        assert_ne!(new_pk, old_pk);

        // The key-change message itself was signed by the old key.
        let published = client.publisher().published();
        let opened = open_message(&published[0].1, &coordinator().sk, &suite).unwrap();
        verify_opened(&opened, &old_pk, &suite).unwrap();
        assert!(verify_opened(&opened, &new_pk, &suite).is_err());
        assert_eq!(opened.new_public_key, new_pk);

        // A later vote is signed by the rotated key.
        client.vote(&proposal, VOTER, 0, 2).unwrap();
        let published = client.publisher().published();
        let opened = open_message(&published[1].1, &coordinator().sk, &suite).unwrap();
        assert_eq!(opened.command.nonce, 2);
        verify_opened(&opened, &new_pk, &suite).unwrap();
        assert!(verify_opened(&opened, &old_pk, &suite).is_err());
    }

    #[test]
    fn poll_cache_round_trips_and_degrades_on_corruption() {
        let client = client();
        let proposal = proposal();
        client.cache_proposal(&proposal).unwrap();
        let cached = client
            .cached_proposal(&proposal.poll_address, proposal.poll_id)
            .unwrap()
            .unwrap();
        assert_eq!(cached.voice_credit_budget, proposal.voice_credit_budget);
        assert_eq!(cached.coordinator_public_key, proposal.coordinator_public_key);

        client
            .backend
            .put("poll_cache:0xpoll:0", "garbage")
            .unwrap();
        assert!(client
            .cached_proposal(&proposal.poll_address, proposal.poll_id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn finalize_closes_the_ballot() {
        let client = client();
        let proposal = proposal();
        client
            .register(&proposal, VOTER, Some([0x01; 32]), &[], &[])
            .unwrap();
        client.finalize(&proposal, VOTER).unwrap();
        assert!(matches!(
            client.vote(&proposal, VOTER, 0, 1),
            Err(Error::VotingClosed)
        ));
        assert!(matches!(
            client.change_key(&proposal, VOTER),
            Err(Error::VotingClosed)
        ));
    }

    #[test]
    fn legacy_decimal_secrets_are_accepted() {
        let sk = Keypair::from_seed([0x01; 32]).sk;
        let as_decimal = {
            let bytes = sk.to_bytes();
            num_bigint::BigUint::from_bytes_le(&bytes).to_string()
        };
        let recovered = private_key_from_stored(as_decimal.as_bytes()).unwrap();
        assert_eq!(recovered, sk);

        assert!(private_key_from_stored(b"0").is_err());
        assert!(private_key_from_stored(b"not a number").is_err());
    }
}
