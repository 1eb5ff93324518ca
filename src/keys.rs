//! Key material: derivation, formatting, and the ECDH shared point.
//!
//! A voter's private key is a scalar in `[1, r)`, held here as its
//! canonical 32-byte little-endian encoding (zeroised on drop). Two
//! scalars are derived from it and it matters which one a caller uses:
//!
//! - the *raw* scalar, which is what gets persisted and re-derived from
//!   a seed, and
//! - the *formatted* scalar — BLAKE-512 of the key bytes, pruned and
//!   shifted right by three — which is the multiplier behind every
//!   point operation (public-key derivation, signing, ECDH). This is
//!   the convention the verification circuits bake in, so a public key
//!   derived any other way will not verify on-chain.
//!
//! ECDH is symmetric precisely because both sides multiply with their
//! formatted scalars: `fmt(a)·(fmt(b)·G) = fmt(b)·(fmt(a)·G)`.

#![forbid(unsafe_code)]

use ark_ec::AffineRepr;
use ark_ff::PrimeField;
use blake::Blake;
use num_bigint::BigUint;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::curve::{self, Point};
use crate::error::{Error, Result};
use crate::field::{scalar_from_bytes_le, scalar_modulus, scalar_to_bytes_le};
use crate::Scalar;

/// BLAKE-512 one-shot, the digest the circuits' key schedule uses.
pub(crate) fn blake_512(input: &[u8]) -> [u8; 64] {
    let mut output = [0u8; 64];
    let mut hasher = Blake::new(512).expect("512 is a supported BLAKE digest size");
    hasher.update(input);
    hasher.finalise(&mut output);
    output
}

/// A voter or ephemeral private key. Always non-zero and below `r`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl PrivateKey {
    /// Deterministic derivation from a 32-byte seed: BLAKE-512, first
    /// half little-endian, reduced mod `r`. The zero outcome has
    /// probability ~2⁻²⁵¹; if it ever occurs the seed is tweaked by one
    /// byte and the derivation retried.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let mut seed = seed;
        loop {
            let digest = blake_512(&seed);
            let mut half = [0u8; 32];
            half.copy_from_slice(&digest[..32]);
            let scalar = Scalar::from_le_bytes_mod_order(&half);
            if !is_zero_scalar(&scalar) {
                return Self {
                    bytes: scalar_to_bytes_le(&scalar),
                };
            }
            seed[0] = seed[0].wrapping_add(1);
        }
    }

    /// Uniform random key via rejection sampling: draw 32 bytes, mask
    /// to 251 bits, accept iff `0 < v < r`. No modular bias, never
    /// zero.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let order = scalar_modulus();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            bytes[31] &= 0x07;
            let v = BigUint::from_bytes_le(&bytes);
            if v > BigUint::from(0u8) && v < order {
                return Self { bytes };
            }
        }
    }

    /// Accept a canonical encoding produced by [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let scalar = scalar_from_bytes_le(bytes)?;
        if is_zero_scalar(&scalar) {
            return Err(Error::Domain("private key scalar is zero"));
        }
        Ok(Self { bytes: *bytes })
    }

    /// Canonical little-endian encoding, the at-rest representation.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    /// The raw scalar value.
    pub fn scalar(&self) -> Scalar {
        Scalar::from_le_bytes_mod_order(&self.bytes)
    }

    /// BLAKE-512 expansion of the key bytes; the halves feed the
    /// formatted scalar and the deterministic signing nonce.
    pub(crate) fn expand(&self) -> [u8; 64] {
        blake_512(&self.bytes)
    }

    /// The circuit-convention multiplier: prune the first digest half
    /// (`&0xF8` / `&0x7F` / `|0x40`), read little-endian, shift right 3.
    pub fn formatted_scalar(&self) -> Scalar {
        let mut half = [0u8; 32];
        half.copy_from_slice(&self.expand()[..32]);
        half[0] &= 0xF8;
        half[31] &= 0x7F;
        half[31] |= 0x40;
        let shifted = BigUint::from_bytes_le(&half) >> 3usize;
        Scalar::from_le_bytes_mod_order(&shifted.to_bytes_le())
    }

    /// `formatted_scalar() · G`. Never the identity in practice: the
    /// pruning pins the top bit of the multiplier, and a zero residue
    /// would require the shifted value to equal the group order
    /// exactly.
    pub fn public_key(&self) -> Point {
        curve::mul_point(&curve::base_point(), &self.formatted_scalar())
            .expect("formatted scalar is never zero")
    }
}

fn is_zero_scalar(s: &Scalar) -> bool {
    use ark_ff::Zero;
    s.is_zero()
}

/// A private key together with its derived public key.
#[derive(Clone, Debug)]
pub struct Keypair {
    /// The secret half.
    pub sk: PrivateKey,
    /// `sk`'s public point in the prime-order subgroup.
    pub pk: Point,
}

impl Keypair {
    /// Pair a private key with its public point.
    pub fn from_sk(sk: PrivateKey) -> Self {
        let pk = sk.public_key();
        Self { sk, pk }
    }

    /// Fresh random keypair. Used both for persistent voter keys and
    /// for the per-message ephemeral keys (the latter are used once and
    /// dropped, never persisted).
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        Self::from_sk(PrivateKey::random(rng))
    }

    /// Derive from a seed, for deterministic test and recovery flows.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_sk(PrivateKey::from_seed(seed))
    }
}

/// ECDH: `fmt(my_sk) · their_pk`. The raw coordinates of the result are
/// consumed directly as the duplex-sponge key; no hashing is applied.
pub fn shared_point(my_sk: &PrivateKey, their_pk: &Point) -> Result<Point> {
    curve::assert_subgroup(their_pk)?;
    if their_pk.is_zero() {
        return Err(Error::Domain("public key is the identity"));
    }
    curve::mul_point(their_pk, &my_sk.formatted_scalar())
}
