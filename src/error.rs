//! Shared error taxonomy.
//!
//! One enum covers the whole core so that callers can match on the *kind*
//! of failure without caring which module produced it. The propagation
//! rules are part of the protocol contract:
//!
//! - Crypto failures (`Domain`, `Range`, `Authentication`) are never
//!   retried internally; they indicate a protocol violation or corrupted
//!   input and must surface verbatim.
//! - `Serialization` means a persisted record could not be decoded; the
//!   record is discarded and treated as absent, never as a wrong value.
//! - `Publisher` failures leave the ballot untouched (the nonce is only
//!   advanced after a publish succeeds), so the caller may retry with the
//!   same message.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by the voting core.
#[derive(Debug, Error)]
pub enum Error {
    /// A mathematical precondition was violated (inversion of zero,
    /// point outside the prime-order subgroup, identity result of a
    /// scalar multiplication). Fatal for the current operation.
    #[error("domain error: {0}")]
    Domain(&'static str),

    /// An input was outside its admissible range (command lane over 50
    /// bits, quadratic cost over the voice-credit budget, oversized
    /// ciphertext).
    #[error("range error: {0}")]
    Range(String),

    /// Authenticated decryption or signature verification failed. Never
    /// masked as success; never retried.
    #[error("authentication failure: {0}")]
    Authentication(&'static str),

    /// A persisted ballot or secret could not be parsed. Callers degrade
    /// to "record absent".
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The external publisher (wallet / RPC transport) rejected the
    /// operation. The ballot nonce has NOT been advanced.
    #[error("publisher error: {0}")]
    Publisher(String),

    /// Another operation currently holds this ballot. Retrying is the
    /// caller's choice.
    #[error("ballot is already being modified")]
    ConcurrentModification,

    /// The poll has been finalized; no further messages can be built or
    /// published for this ballot.
    #[error("voting has closed for this ballot")]
    VotingClosed,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
