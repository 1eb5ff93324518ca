//! Poseidon duplex-sponge authenticated encryption (rate 3, capacity 1).
//!
//! The construction alternates absorb and squeeze inside one
//! permutation chain over a width-4 state. The IV binds the key, the
//! caller-chosen nonce, and the *claimed* plaintext length:
//!
//! ```text
//! state₀ = [0, kX, kY, nonce + L·2¹²⁸]
//! ```
//!
//! Per 3-block: permute, add the plaintext block into lanes 1..4, emit
//! those lanes as ciphertext. One final permutation yields the tag
//! (lane 1). On the wire the ciphertext carries exactly `L` rate
//! elements plus the tag — the zero padding of a final partial block is
//! implicit, and the decryptor reconstructs it from its own state, so
//! nothing is lost by not transmitting it. Because `L` is welded into
//! the IV, truncation and length-forgery both surface as tag failures.
//!
//! Contract: the output is a deterministic function of
//! `(plaintext, key, nonce, L)`. Distinct messages under one key must
//! use distinct nonces; this module neither detects nor prevents reuse
//! (the message assembler guarantees freshness through per-message
//! ephemeral keys instead).

#![forbid(unsafe_code)]

use ark_ff::{Field, Zero};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::field::f_to_bytes_le;
use crate::poseidon::{permute, SPONGE_WIDTH};
use crate::F;

/// Rate lanes per permutation call.
pub const RATE: usize = 3;

fn two_pow_128() -> F {
    F::from(2u64).pow([128u64])
}

fn initial_state(key: (F, F), nonce: u128, len: usize) -> [F; SPONGE_WIDTH] {
    [
        F::zero(),
        key.0,
        key.1,
        F::from(nonce) + F::from(len as u64) * two_pow_128(),
    ]
}

/// Encrypt `plaintext` under the shared-point `key`. Returns
/// `plaintext.len() + 1` field elements: the rate outputs followed by
/// the authentication tag.
pub fn encrypt(plaintext: &[F], key: (F, F), nonce: u128) -> Result<Vec<F>> {
    let len = plaintext.len();
    let blocks = (len + RATE - 1) / RATE;
    let mut state = initial_state(key, nonce, len);
    let mut out = Vec::with_capacity(len + 1);

    for block in 0..blocks {
        permute(&mut state)?;
        for lane in 0..RATE {
            let idx = block * RATE + lane;
            if idx < len {
                state[1 + lane] += plaintext[idx];
                out.push(state[1 + lane]);
            }
            // Implicit zero padding: the lane is unchanged and its
            // would-be ciphertext element is not transmitted.
        }
    }

    permute(&mut state)?;
    out.push(state[1]);
    Ok(out)
}

/// Decrypt a ciphertext of claimed plaintext length `len`. The tag is
/// compared in constant time; any mismatch — flipped element, wrong
/// key, wrong nonce, or a forged length — is `Authentication`.
pub fn decrypt(ciphertext: &[F], key: (F, F), nonce: u128, len: usize) -> Result<Vec<F>> {
    if ciphertext.len() != len + 1 {
        return Err(Error::Authentication(
            "ciphertext length does not match the claimed plaintext length",
        ));
    }

    let blocks = (len + RATE - 1) / RATE;
    let mut state = initial_state(key, nonce, len);
    let mut plaintext = Vec::with_capacity(len);

    for block in 0..blocks {
        permute(&mut state)?;
        for lane in 0..RATE {
            let idx = block * RATE + lane;
            if idx < len {
                plaintext.push(ciphertext[idx] - state[1 + lane]);
                state[1 + lane] = ciphertext[idx];
            }
        }
    }

    permute(&mut state)?;
    let expected = f_to_bytes_le(&state[1]);
    let received = f_to_bytes_le(&ciphertext[len]);
    if !bool::from(expected.ct_eq(&received)) {
        return Err(Error::Authentication("sponge tag mismatch"));
    }
    Ok(plaintext)
}
