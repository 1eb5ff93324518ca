//! Crate root: public surface, core aliases, and protocol-wide invariants
//!
//! Client-side cryptographic core of a MACI voting participant. The
//! crate turns a voter's intent — a vote or a key change — into the
//! fixed 10-element encrypted message the coordinator processes inside
//! a zk-SNARK circuit, and maintains the per-(voter, poll) ballot state
//! that makes the protocol's reverse-order processing sound.
//!
//! ## Invariants (circuit-aligned)
//!
//! - **Field & curve.** All wire values are canonical elements of the
//!   BN254 scalar field (`F`); all points live in the prime-order
//!   subgroup of Baby Jubjub, whose base field *is* `F` — that embedding
//!   is what lets the coordinator verify everything in-circuit. We
//!   forbid unsafe throughout the crate.
//!
//! - **Hash discipline.** Poseidon with the circom BN254 parameter set,
//!   bit-for-bit: the same constants drive the fixed-arity hashes, the
//!   EdDSA challenge, and the duplex-sponge authenticated encryption.
//!
//! - **Key formatting.** Every point multiplication uses the BLAKE-512
//!   pruned-and-shifted scalar, matching the circuits' internal key
//!   derivation; a public key derived any other way will not verify.
//!
//! - **Nonce discipline.** Votes and key changes share one
//!   monotonically increasing nonce per ballot, advanced only after a
//!   publish succeeds and never rolled back. The coordinator applies
//!   the *smallest* effective nonce; this core never reorders.
//!
//! Failures are precise [`Error`] values, never silent corruption: a
//! record that cannot be decoded degrades to "absent", and a tag or
//! signature mismatch is surfaced verbatim.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Ballot records, the shared-nonce discipline, and the guarded store.
pub mod ballot;
/// The happy-path client wiring registration, votes, and key changes.
pub mod client;
/// Command packing (five 50-bit lanes) and the command hash.
pub mod command;
/// Baby Jubjub twisted Edwards group and coordinate codecs.
pub mod curve;
/// EdDSA-Poseidon signatures over the curve.
pub mod eddsa;
/// Error taxonomy shared by every module.
pub mod error;
/// Canonical field-element encoding boundary.
pub mod field;
/// Private-key derivation, formatted scalars, and ECDH.
pub mod keys;
/// Message assembly to and from the fixed on-chain layout.
pub mod message;
/// Poseidon permutation and fixed-arity hashes (circom parameters).
pub mod poseidon;
/// Poll parameters handed in from outside.
pub mod proposal;
/// The outward publisher contract and the in-memory double.
pub mod publisher;
/// Duplex-sponge authenticated encryption.
pub mod sponge;
/// Persistent backends and the secret-key-at-rest store.
pub mod store;
/// The crypto capability seam and the production suite.
pub mod suite;

// ============================================================================
// Canonical aliases and root-level constants
// ============================================================================

/// The BN254 scalar field — simultaneously the base field of Baby
/// Jubjub, so curve coordinates are wire values without conversion.
pub type F = ark_bn254::Fr;

/// The Baby Jubjub prime-subgroup order field: signature scalars and
/// secret multipliers live here.
pub type Scalar = ark_ed_on_bn254::Fr;

/// Fixed on-chain message length (`uint256[10]`).
pub const FIXED_MSG_LEN: usize = 10;

/// Elements in a command plaintext:
/// `[packed, newPk.x, newPk.y, salt, R.x, R.y, S]`.
pub const PLAINTEXT_LEN: usize = 7;

// ============================================================================
// Root re-exports
// ============================================================================

pub use ballot::{Ballot, BallotKey, BallotStore, LastVote};
pub use client::VotingClient;
pub use command::Command;
pub use curve::Point;
pub use eddsa::Signature;
pub use error::{Error, Result};
pub use keys::{Keypair, PrivateKey};
pub use message::{BuiltMessage, EncryptedMessage, OpenedCommand};
pub use proposal::ProposalDescriptor;
pub use publisher::{MemoryPublisher, Publisher, TxReceipt};
pub use store::{FileBackend, MemoryBackend, SecretStore, StorageBackend};
pub use suite::{Bn254Suite, CryptoSuite, RngSource};
