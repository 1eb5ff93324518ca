//! The crypto capability seam.
//!
//! The message assembler and the client consume the primitives through
//! [`CryptoSuite`] rather than calling the modules directly. That keeps
//! randomness in one injectable place (no hidden globals), lets tests
//! and the demo binary run the whole pipeline deterministically from a
//! seed, and leaves room to swap hardened primitives in behind the same
//! surface.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::command;
use crate::curve::Point;
use crate::eddsa::{self, Signature};
use crate::error::Result;
use crate::keys::{self, Keypair, PrivateKey};
use crate::sponge;
use crate::F;

/// Where the suite draws randomness from. `Seeded` exists for tests and
/// demos only — a production voter must use the system RNG.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RngSource {
    /// Operating-system entropy.
    System,
    /// Deterministic stream from a fixed seed (test/demo only).
    Seeded([u8; 32]),
}

impl RngSource {
    fn build(&self) -> StdRng {
        match self {
            RngSource::System => StdRng::from_entropy(),
            RngSource::Seeded(seed) => StdRng::from_seed(*seed),
        }
    }
}

/// The primitive operations the message pipeline needs.
pub trait CryptoSuite: Send + Sync {
    /// A fresh persistent keypair (registration, key change).
    fn generate_keypair(&self) -> Keypair;
    /// A fresh per-message keypair; used once and dropped.
    fn ephemeral_keypair(&self) -> Keypair;
    /// ECDH shared point consumed as the sponge key.
    fn shared_point(&self, my_sk: &PrivateKey, their_pk: &Point) -> Result<Point>;
    /// A fresh canonical salt.
    fn random_salt(&self) -> F;
    /// The signed command digest.
    fn command_hash(&self, packed: F, new_pk: &Point, salt: F) -> Result<F>;
    fn sign(&self, message: F, sk: &PrivateKey) -> Result<Signature>;
    fn verify(&self, message: F, sig: &Signature, pk: &Point) -> Result<()>;
    fn encrypt(&self, plaintext: &[F], key: (F, F), nonce: u128) -> Result<Vec<F>>;
    fn decrypt(&self, ciphertext: &[F], key: (F, F), nonce: u128, len: usize) -> Result<Vec<F>>;
}

/// Production suite: Poseidon / Baby Jubjub / BLAKE-512 as the circuits
/// expect, with a thread-safe RNG. The mutex serialises key and salt
/// generation across callers; everything else is pure.
pub struct Bn254Suite {
    rng: Mutex<StdRng>,
}

impl Bn254Suite {
    pub fn new(source: RngSource) -> Self {
        Self {
            rng: Mutex::new(source.build()),
        }
    }

    /// Suite over operating-system entropy.
    pub fn system() -> Self {
        Self::new(RngSource::System)
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        let mut rng = self.rng.lock().expect("suite rng poisoned");
        f(&mut *rng)
    }
}

impl CryptoSuite for Bn254Suite {
    fn generate_keypair(&self) -> Keypair {
        self.with_rng(|rng| Keypair::random(rng))
    }

    fn ephemeral_keypair(&self) -> Keypair {
        self.with_rng(|rng| Keypair::random(rng))
    }

    fn shared_point(&self, my_sk: &PrivateKey, their_pk: &Point) -> Result<Point> {
        keys::shared_point(my_sk, their_pk)
    }

    fn random_salt(&self) -> F {
        self.with_rng(|rng| command::random_salt(rng))
    }

    fn command_hash(&self, packed: F, new_pk: &Point, salt: F) -> Result<F> {
        command::command_hash(packed, new_pk, salt)
    }

    fn sign(&self, message: F, sk: &PrivateKey) -> Result<Signature> {
        eddsa::sign(message, sk)
    }

    fn verify(&self, message: F, sig: &Signature, pk: &Point) -> Result<()> {
        eddsa::verify(message, sig, pk)
    }

    fn encrypt(&self, plaintext: &[F], key: (F, F), nonce: u128) -> Result<Vec<F>> {
        sponge::encrypt(plaintext, key, nonce)
    }

    fn decrypt(&self, ciphertext: &[F], key: (F, F), nonce: u128, len: usize) -> Result<Vec<F>> {
        sponge::decrypt(ciphertext, key, nonce, len)
    }
}
