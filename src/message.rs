//! Message assembly: from a voter's intent to the fixed 10-element
//! on-chain ciphertext, and back again on the coordinator side.
//!
//! Pipeline for one message:
//!
//! 1. pack the command and draw a 31-byte salt,
//! 2. `cmdHash = Poseidon(packed, newPk.x, newPk.y, salt)`,
//! 3. EdDSA-sign the hash under the voter's current key,
//! 4. lay out the 7-element plaintext
//!    `[packed, newPk.x, newPk.y, salt, R.x, R.y, S]`,
//! 5. fresh ephemeral keypair; ECDH shared point with the coordinator,
//! 6. duplex-encrypt with sponge nonce 0 (freshness comes from the
//!    ephemeral key, not the sponge nonce),
//! 7. right-pad the 8-element ciphertext with zeros to 10 slots and
//!    attach the ephemeral public key's two coordinates.
//!
//! Assembly is *pure* with respect to the ballot: the caller reads the
//! nonce out of the ballot and applies the increment only after the
//! publisher accepts the message (see the client module). That split is
//! what makes the cancel-safety rule enforceable.

#![forbid(unsafe_code)]

use crate::ballot::{Ballot, LastVote};
use crate::command::{self, Command};
use crate::curve::{self, Point};
use crate::eddsa::Signature;
use crate::error::{Error, Result};
use crate::field::{f_to_dec, f_to_scalar, scalar_to_f};
use crate::keys::{Keypair, PrivateKey};
use crate::proposal::ProposalDescriptor;
use crate::suite::CryptoSuite;
use crate::{F, FIXED_MSG_LEN, PLAINTEXT_LEN};

use ark_ff::Zero;

/// Ciphertext slots actually carrying data (plaintext plus tag).
pub const CIPHERTEXT_LEN: usize = PLAINTEXT_LEN + 1;

/// The wire form of one message: ten field elements of ciphertext and
/// the ephemeral public key as exactly two field elements (the on-chain
/// function signature is the source of truth for that shape).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// Ciphertext, zero-padded to the fixed on-chain length.
    pub data: [F; FIXED_MSG_LEN],
    /// Ephemeral public key coordinates `(x, y)`.
    pub enc_pub_key: (F, F),
}

impl EncryptedMessage {
    /// Decimal strings for the RPC payload (`uint256[10]`).
    pub fn data_decimal(&self) -> [String; FIXED_MSG_LEN] {
        std::array::from_fn(|i| f_to_dec(&self.data[i]))
    }
}

/// Product of a successful assembly, before anything is published.
pub struct BuiltMessage {
    /// The wire message.
    pub message: EncryptedMessage,
    /// The command that was encrypted (for the caller's bookkeeping).
    pub command: Command,
    /// Display record to apply to the ballot after a vote publish.
    pub record: Option<LastVote>,
    /// For key changes: the freshly generated keypair that must be
    /// persisted and bound once the publish succeeds.
    pub new_keypair: Option<Keypair>,
}

/// Assemble a vote message. Fails with `Range` when the choice is
/// outside the proposal's option space or the quadratic cost exceeds
/// the voice-credit budget; the ballot must be registered and active.
pub fn build_vote_message(
    proposal: &ProposalDescriptor,
    voter_sk: &PrivateKey,
    ballot: &Ballot,
    choice: u64,
    weight: u64,
    suite: &dyn CryptoSuite,
) -> Result<BuiltMessage> {
    ballot.ensure_active()?;
    let (bound_pk, state_index) = bound_identity(ballot)?;

    if choice >= proposal.vote_options {
        return Err(Error::Range(format!(
            "vote option {choice} out of range (proposal has {})",
            proposal.vote_options
        )));
    }
    let cost = weight
        .checked_mul(weight)
        .ok_or_else(|| Error::Range("vote weight overflows its quadratic cost".into()))?;
    if cost > proposal.voice_credit_budget {
        return Err(Error::Range(format!(
            "quadratic cost {cost} exceeds the voice-credit budget {}",
            proposal.voice_credit_budget
        )));
    }

    let command = Command::for_vote(
        state_index,
        choice,
        weight,
        ballot.next_nonce,
        proposal.poll_id,
    );
    let message = assemble(proposal, voter_sk, command, &bound_pk, suite)?;
    Ok(BuiltMessage {
        message,
        command,
        record: Some(LastVote {
            choice,
            weight,
            cost,
        }),
        new_keypair: None,
    })
}

/// Assemble a key-change message: vote lanes zeroed, a fresh keypair as
/// the switch target, signed under the *current* key. The new secret is
/// returned for persistence; it must not be bound until the publish
/// succeeds.
pub fn build_key_change_message(
    proposal: &ProposalDescriptor,
    voter_sk: &PrivateKey,
    ballot: &Ballot,
    suite: &dyn CryptoSuite,
) -> Result<BuiltMessage> {
    ballot.ensure_active()?;
    let (_, state_index) = bound_identity(ballot)?;

    let new_keypair = suite.generate_keypair();
    let command = Command::for_key_change(state_index, ballot.next_nonce, proposal.poll_id);
    let message = assemble(proposal, voter_sk, command, &new_keypair.pk, suite)?;
    Ok(BuiltMessage {
        message,
        command,
        record: None,
        new_keypair: Some(new_keypair),
    })
}

fn bound_identity(ballot: &Ballot) -> Result<(Point, u64)> {
    debug_assert!(ballot.next_nonce >= 1);
    match (ballot.bound_public_key, ballot.state_index) {
        (Some(pk), Some(idx)) => Ok((pk, idx)),
        _ => Err(Error::Domain("ballot is not registered")),
    }
}

fn assemble(
    proposal: &ProposalDescriptor,
    voter_sk: &PrivateKey,
    command: Command,
    new_pk: &Point,
    suite: &dyn CryptoSuite,
) -> Result<EncryptedMessage> {
    let packed = command.pack()?;
    let salt = suite.random_salt();
    let digest = suite.command_hash(packed, new_pk, salt)?;
    let signature = suite.sign(digest, voter_sk)?;

    let plaintext = [
        packed,
        new_pk.x,
        new_pk.y,
        salt,
        signature.r.x,
        signature.r.y,
        scalar_to_f(&signature.s),
    ];

    let ephemeral = suite.ephemeral_keypair();
    let shared = suite.shared_point(&ephemeral.sk, &proposal.coordinator_public_key)?;
    let ciphertext = suite.encrypt(&plaintext, (shared.x, shared.y), 0)?;

    if ciphertext.len() > FIXED_MSG_LEN {
        return Err(Error::Range(format!(
            "ciphertext has {} elements, exceeding the fixed message length",
            ciphertext.len()
        )));
    }
    let mut data = [F::zero(); FIXED_MSG_LEN];
    data[..ciphertext.len()].copy_from_slice(&ciphertext);

    Ok(EncryptedMessage {
        data,
        enc_pub_key: (ephemeral.pk.x, ephemeral.pk.y),
    })
}

/// A message opened on the coordinator side, before signature checking.
#[derive(Clone, Debug)]
pub struct OpenedCommand {
    /// The unpacked command.
    pub command: Command,
    /// Key the command switches to (the current key for plain votes).
    pub new_public_key: Point,
    /// The salt that blinded the command hash.
    pub salt: F,
    /// The embedded signature.
    pub signature: Signature,
    /// The recomputed signed digest.
    pub digest: F,
}

/// Open a published message with the coordinator's key: recompute the
/// shared point from the ephemeral coordinates, verify the zero
/// padding, decrypt with claimed length [`PLAINTEXT_LEN`], and unpack.
/// Signature verification is separate ([`verify_opened`]) because the
/// verifying key is the voter's *state-tree* key, which for key changes
/// differs from the key embedded in the plaintext.
pub fn open_message(
    message: &EncryptedMessage,
    coordinator_sk: &PrivateKey,
    suite: &dyn CryptoSuite,
) -> Result<OpenedCommand> {
    let ephemeral = curve::from_coords(message.enc_pub_key.0, message.enc_pub_key.1)?;
    let shared = suite.shared_point(coordinator_sk, &ephemeral)?;

    for slot in &message.data[CIPHERTEXT_LEN..] {
        if !slot.is_zero() {
            return Err(Error::Authentication("message padding is not zero"));
        }
    }

    let plaintext = suite.decrypt(
        &message.data[..CIPHERTEXT_LEN],
        (shared.x, shared.y),
        0,
        PLAINTEXT_LEN,
    )?;

    let command = Command::unpack(&plaintext[0])?;
    command.validate_full_layout()?;
    let new_public_key = curve::from_coords(plaintext[1], plaintext[2])?;
    let signature = Signature {
        r: curve::from_coords(plaintext[4], plaintext[5])?,
        s: f_to_scalar(&plaintext[6])?,
    };
    let digest = suite.command_hash(plaintext[0], &new_public_key, plaintext[3])?;

    Ok(OpenedCommand {
        command,
        new_public_key,
        salt: plaintext[3],
        signature,
        digest,
    })
}

/// Check an opened command's signature against the voter key the state
/// tree currently holds.
pub fn verify_opened(
    opened: &OpenedCommand,
    expected_pk: &Point,
    suite: &dyn CryptoSuite,
) -> Result<()> {
    suite.verify(opened.digest, &opened.signature, expected_pk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::Ballot;
    use crate::suite::{Bn254Suite, RngSource};

    fn suite() -> Bn254Suite {
        Bn254Suite::new(RngSource::Seeded([0x42; 32]))
    }

    fn coordinator() -> Keypair {
        Keypair::from_seed([0x02; 32])
    }

    fn proposal() -> ProposalDescriptor {
        ProposalDescriptor::new("0xpoll", 0, coordinator().pk, 2, 35, 10, None).unwrap()
    }

    fn registered_ballot(voter: &Keypair) -> Ballot {
        let mut ballot = Ballot::new();
        ballot.bind(voter.pk, 1);
        ballot
    }

    /// Fixture: full vote round trip, choice 1 at weight 1.
    #[test]
    fn vote_round_trip_recovers_the_command() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let ballot = registered_ballot(&voter);

        let built =
            build_vote_message(&proposal(), &voter.sk, &ballot, 1, 1, &suite).unwrap();
        assert_eq!(built.record.unwrap().cost, 1);

        // 7-element plaintext ⇒ 8 ciphertext elements ⇒ two zero slots.
        assert!(built.message.data[CIPHERTEXT_LEN..]
            .iter()
            .all(|slot| slot.is_zero()));

        let opened = open_message(&built.message, &coordinator().sk, &suite).unwrap();
        assert_eq!(opened.command.state_index, 1);
        assert_eq!(opened.command.vote_option_index, 1);
        assert_eq!(opened.command.new_vote_weight, 1);
        assert_eq!(opened.command.nonce, 1);
        assert_eq!(opened.command.poll_id, 0);
        assert_eq!(opened.new_public_key, voter.pk);
        verify_opened(&opened, &voter.pk, &suite).unwrap();
    }

    /// Fixture: quadratic cost enforcement at a budget of 35.
    #[test]
    fn quadratic_cost_is_enforced() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let ballot = registered_ballot(&voter);
        let proposal = proposal();

        // weight 6 ⇒ cost 36 > 35.
        assert!(matches!(
            build_vote_message(&proposal, &voter.sk, &ballot, 1, 6, &suite),
            Err(Error::Range(_))
        ));

        // weight 5 ⇒ cost 25 ≤ 35.
        let built = build_vote_message(&proposal, &voter.sk, &ballot, 1, 5, &suite).unwrap();
        assert_eq!(
            built.record.unwrap(),
            LastVote {
                choice: 1,
                weight: 5,
                cost: 25
            }
        );
    }

    #[test]
    fn out_of_range_choices_are_refused() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let ballot = registered_ballot(&voter);
        assert!(matches!(
            build_vote_message(&proposal(), &voter.sk, &ballot, 2, 1, &suite),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn unregistered_ballots_cannot_vote() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let ballot = Ballot::new();
        assert!(matches!(
            build_vote_message(&proposal(), &voter.sk, &ballot, 0, 1, &suite),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn finalized_ballots_cannot_vote() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let mut ballot = registered_ballot(&voter);
        ballot.finalize();
        assert!(matches!(
            build_vote_message(&proposal(), &voter.sk, &ballot, 0, 1, &suite),
            Err(Error::VotingClosed)
        ));
    }

    /// Fixture: a key change invalidates signatures made under the old
    /// key, and the change itself is signed by the old key.
    #[test]
    fn key_change_swaps_the_verifying_key() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let ballot = registered_ballot(&voter);
        let proposal = proposal();

        // A vote signed under the old key verifies against it.
        let vote = build_vote_message(&proposal, &voter.sk, &ballot, 1, 1, &suite).unwrap();
        let opened_vote = open_message(&vote.message, &coordinator().sk, &suite).unwrap();
        verify_opened(&opened_vote, &voter.pk, &suite).unwrap();

        // The key change embeds a fresh key but is signed by the old one.
        let change = build_key_change_message(&proposal, &voter.sk, &ballot, &suite).unwrap();
        let new_kp = change.new_keypair.as_ref().unwrap();
        assert_ne!(new_kp.pk, voter.pk);

        let opened_change = open_message(&change.message, &coordinator().sk, &suite).unwrap();
        assert_eq!(opened_change.command.vote_option_index, 0);
        assert_eq!(opened_change.command.new_vote_weight, 0);
        assert_eq!(opened_change.new_public_key, new_kp.pk);
        verify_opened(&opened_change, &voter.pk, &suite).unwrap();

        // After the switch, the old vote's signature no longer verifies
        // against the new tree key.
        assert!(verify_opened(&opened_vote, &new_kp.pk, &suite).is_err());
    }

    /// Fixture: identical plaintexts from two voters are unlinkable on
    /// the wire.
    #[test]
    fn identical_votes_produce_unrelated_ciphertexts() {
        let suite = suite();
        let proposal = proposal();
        let a = Keypair::from_seed([0x0a; 32]);
        let b = Keypair::from_seed([0x0b; 32]);
        let ballot_a = registered_ballot(&a);
        let ballot_b = registered_ballot(&b);

        let msg_a = build_vote_message(&proposal, &a.sk, &ballot_a, 1, 1, &suite)
            .unwrap()
            .message;
        let msg_b = build_vote_message(&proposal, &b.sk, &ballot_b, 1, 1, &suite)
            .unwrap()
            .message;

        assert_eq!(msg_a.data.len(), msg_b.data.len());
        assert_ne!(msg_a.enc_pub_key, msg_b.enc_pub_key);
        for i in 0..CIPHERTEXT_LEN {
            assert_ne!(msg_a.data[i], msg_b.data[i], "slot {i} leaked equality");
        }
    }

    /// Fixture: flipping a ciphertext element, or decrypting with a
    /// third party's shared point, fails authentication.
    #[test]
    fn tampered_or_misdirected_messages_fail() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let ballot = registered_ballot(&voter);
        let built = build_vote_message(&proposal(), &voter.sk, &ballot, 1, 1, &suite).unwrap();

        let mut tampered = built.message.clone();
        tampered.data[2] += F::from(1u64);
        assert!(matches!(
            open_message(&tampered, &coordinator().sk, &suite),
            Err(Error::Authentication(_))
        ));

        let mut bad_padding = built.message.clone();
        bad_padding.data[9] = F::from(1u64);
        assert!(matches!(
            open_message(&bad_padding, &coordinator().sk, &suite),
            Err(Error::Authentication(_))
        ));

        let outsider = Keypair::from_seed([0x03; 32]);
        assert!(matches!(
            open_message(&built.message, &outsider.sk, &suite),
            Err(Error::Authentication(_))
        ));
    }

    /// Fixture: two publishes carry consecutive nonces; ordering them
    /// is the coordinator's reverse-processing rule, not ours.
    #[test]
    fn successive_votes_carry_consecutive_nonces() {
        let suite = suite();
        let voter = Keypair::from_seed([0x01; 32]);
        let mut ballot = registered_ballot(&voter);
        let proposal = proposal();
        let coordinator = coordinator();

        let first = build_vote_message(&proposal, &voter.sk, &ballot, 0, 1, &suite).unwrap();
        ballot.record_publish(first.record);
        let second = build_vote_message(&proposal, &voter.sk, &ballot, 1, 1, &suite).unwrap();
        ballot.record_publish(second.record);

        let opened_first = open_message(&first.message, &coordinator.sk, &suite).unwrap();
        let opened_second = open_message(&second.message, &coordinator.sk, &suite).unwrap();
        assert_eq!(opened_first.command.nonce, 1);
        assert_eq!(opened_first.command.vote_option_index, 0);
        assert_eq!(opened_second.command.nonce, 2);
        assert_eq!(opened_second.command.vote_option_index, 1);
        assert_eq!(ballot.next_nonce, 3);
    }
}
