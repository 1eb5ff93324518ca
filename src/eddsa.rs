//! EdDSA over Baby Jubjub with a Poseidon challenge.
//!
//! Signs a single base-field element — in this crate always a Poseidon
//! command hash. The schedule matches the verification circuit exactly:
//! with `h = BLAKE-512(sk bytes) = hL ‖ hR` and `s` the formatted
//! scalar (`prune(hL) >> 3`),
//!
//! ```text
//! r = BLAKE-512(hR ‖ le32(m)) mod r
//! R = r·G
//! k = Poseidon(R.x, R.y, A.x, A.y, m)
//! S = r + k·s        (mod r)
//! ```
//!
//! Verification accepts iff `S·G == R + k·A` with `R` and `A` checked
//! into the prime-order subgroup first. Because both the signing nonce
//! and the key multiplier are derived by hashing, the scheme is
//! deterministic: the same `(sk, m)` always yields the same signature.
//!
//! Malleated encodings (`S ≥ r`, non-canonical coordinates) cannot
//! reach this module: the decoding boundary in `field`/`curve` refuses
//! them.

#![forbid(unsafe_code)]

use ark_ec::AffineRepr;
use std::ops::Mul;

use crate::curve::{self, Point};
use crate::error::{Error, Result};
use crate::field::{f_to_bytes_le, reduce_wide_scalar};
use crate::keys::{blake_512, PrivateKey};
use crate::poseidon;
use crate::{Scalar, F};

/// An EdDSA signature: the nonce point and the response scalar.
/// Immutable once produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Nonce commitment `R = r·G`.
    pub r: Point,
    /// Response `S = r + k·s (mod r)`.
    pub s: Scalar,
}

/// Sign a field element under `sk`.
pub fn sign(message: F, sk: &PrivateKey) -> Result<Signature> {
    let expanded = sk.expand();

    // Deterministic nonce: hash the second digest half with the
    // little-endian message encoding, then reduce into the scalar field.
    let mut nonce_input = [0u8; 64];
    nonce_input[..32].copy_from_slice(&expanded[32..]);
    nonce_input[32..].copy_from_slice(&f_to_bytes_le(&message));
    let nonce = reduce_wide_scalar(&blake_512(&nonce_input));

    let r_point = curve::mul_point(&curve::base_point(), &nonce)?;
    let public = sk.public_key();

    let challenge = challenge_scalar(&r_point, &public, message)?;
    let s = nonce + challenge * sk.formatted_scalar();

    Ok(Signature { r: r_point, s })
}

/// Verify `sig` over `message` against `pk`.
///
/// `Domain` for points outside the prime-order subgroup,
/// `Authentication` for a signature that does not check out. Never
/// returns success on a mismatch.
pub fn verify(message: F, sig: &Signature, pk: &Point) -> Result<()> {
    curve::assert_subgroup(&sig.r)?;
    curve::assert_subgroup(pk)?;
    if pk.is_zero() {
        return Err(Error::Domain("public key is the identity"));
    }

    let challenge = challenge_scalar(&sig.r, pk, message)?;
    let left = curve::base_point().mul(sig.s);
    let right = sig.r.into_group() + pk.mul(challenge);
    if left != right {
        return Err(Error::Authentication("eddsa signature rejected"));
    }
    Ok(())
}

/// `k = Poseidon(R.x, R.y, A.x, A.y, m)`, reduced into the scalar
/// field. Reducing before the multiplication is equivalent to the
/// circuit's modular arithmetic since everything is taken mod `r`.
fn challenge_scalar(r_point: &Point, pk: &Point, message: F) -> Result<Scalar> {
    let k = poseidon::hash_n(&[r_point.x, r_point.y, pk.x, pk.y, message])?;
    let mut wide = [0u8; 64];
    wide[..32].copy_from_slice(&f_to_bytes_le(&k));
    Ok(reduce_wide_scalar(&wide))
}
