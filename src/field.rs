//! Canonical field-element encoding and the fallible scalar operations.
//!
//! Arithmetic itself (add/sub/mul/neg/pow/eq) comes from `ark-ff` on the
//! two fields this crate touches: the BN254 scalar field `F` (which is
//! also the Baby Jubjub base field) and the Baby Jubjub subgroup-order
//! field `Scalar`. This module owns the *boundary*: every byte string
//! that enters or leaves the crate passes through the canonical
//! little-endian codecs here, and decoding rejects non-reduced input
//! instead of silently wrapping it.
//!
//! Invariant: every `F` emitted to the wire is in `[0, p)` and every
//! `Scalar` accepted at a key boundary is in `[1, r)`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::{BigInteger, Field, PrimeField};
use num_bigint::BigUint;

use crate::error::{Error, Result};
use crate::{Scalar, F};

/// Multiplicative inverse in the base field. `Domain` for zero.
pub fn inverse(x: &F) -> Result<F> {
    x.inverse().ok_or(Error::Domain("inversion of zero"))
}

/// Canonical 32-byte little-endian encoding of a base-field element.
pub fn f_to_bytes_le(x: &F) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&x.into_bigint().to_bytes_le());
    out
}

/// Decode a canonical base-field element; values `>= p` are rejected.
pub fn f_from_bytes_le(bytes: &[u8; 32]) -> Result<F> {
    let v = BigUint::from_bytes_le(bytes);
    if v >= f_modulus() {
        return Err(Error::Serialization(
            "field element is not in canonical form".into(),
        ));
    }
    Ok(F::from_le_bytes_mod_order(bytes))
}

/// Canonical 32-byte little-endian encoding of a subgroup scalar.
pub fn scalar_to_bytes_le(s: &Scalar) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&s.into_bigint().to_bytes_le());
    out
}

/// Decode a canonical subgroup scalar; values `>= r` are rejected.
pub fn scalar_from_bytes_le(bytes: &[u8; 32]) -> Result<Scalar> {
    let v = BigUint::from_bytes_le(bytes);
    if v >= scalar_modulus() {
        return Err(Error::Serialization(
            "scalar is not in canonical form".into(),
        ));
    }
    Ok(Scalar::from_le_bytes_mod_order(bytes))
}

/// Re-encode a signature scalar as a wire field element (`r < p`, so
/// this embedding is exact).
pub fn scalar_to_f(s: &Scalar) -> F {
    F::from_le_bytes_mod_order(&scalar_to_bytes_le(s))
}

/// Recover a signature scalar from a wire field element. Values `>= r`
/// are a malleated encoding and are refused.
pub fn f_to_scalar(x: &F) -> Result<Scalar> {
    let bytes = f_to_bytes_le(x);
    let v = BigUint::from_bytes_le(&bytes);
    if v >= scalar_modulus() {
        return Err(Error::Authentication("scalar exceeds the subgroup order"));
    }
    Ok(Scalar::from_le_bytes_mod_order(&bytes))
}

/// Decimal string form, used for persisted points and RPC payloads.
pub fn f_to_dec(x: &F) -> String {
    BigUint::from_bytes_le(&f_to_bytes_le(x)).to_string()
}

/// Parse a decimal string back into a canonical field element.
pub fn f_from_dec(s: &str) -> Result<F> {
    let v: BigUint = s
        .parse()
        .map_err(|_| Error::Serialization(format!("not a decimal field element: {s:?}")))?;
    if v >= f_modulus() {
        return Err(Error::Serialization(
            "decimal value is not a canonical field element".into(),
        ));
    }
    let bytes = v.to_bytes_le();
    Ok(F::from_le_bytes_mod_order(&bytes))
}

/// Reduce a 31-byte random string into the base field. The value is
/// below `2^248 < p`, so the result is always canonical; whether the
/// resulting distribution is strict enough for the circuits is an open
/// protocol question, and only `< p` is guaranteed here.
pub fn salt_from_bytes(bytes: &[u8; 31]) -> F {
    F::from_le_bytes_mod_order(bytes)
}

/// Reduce a 64-byte hash output into the base field (little-endian).
pub fn reduce_wide_f(bytes: &[u8; 64]) -> F {
    F::from_le_bytes_mod_order(bytes)
}

/// Reduce a 64-byte hash output into the subgroup-order field.
pub fn reduce_wide_scalar(bytes: &[u8; 64]) -> Scalar {
    Scalar::from_le_bytes_mod_order(bytes)
}

pub(crate) fn f_modulus() -> BigUint {
    BigUint::from_bytes_le(&F::MODULUS.to_bytes_le())
}

pub(crate) fn scalar_modulus() -> BigUint {
    BigUint::from_bytes_le(&Scalar::MODULUS.to_bytes_le())
}
