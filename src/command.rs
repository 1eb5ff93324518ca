//! Command packing, unpacking, and the command hash.
//!
//! A command is the voter's intent: five 50-bit lanes packed into one
//! field element (250 bits, comfortably inside the 254-bit field):
//!
//! ```text
//! packed = stateIndex
//!        | voteOptionIndex << 50
//!        | newVoteWeight   << 100
//!        | nonce           << 150
//!        | pollId          << 200
//! ```
//!
//! Key changes are ordinary commands with the vote lanes zeroed; votes
//! and key changes draw from the same nonce counter. A degenerate
//! "short form" (a bare state index with a zero nonce) circulates in
//! older tooling; it is rejected on ingest here — every processed
//! command must carry the full lane layout with `nonce ≥ 1`, and any
//! residue above bit 250 refuses to unpack.

#![forbid(unsafe_code)]

use ark_ff::PrimeField;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::curve::Point;
use crate::error::{Error, Result};
use crate::field::salt_from_bytes;
use crate::poseidon;
use crate::F;

/// Width of each packed lane.
pub const LANE_BITS: u32 = 50;

const LANE_MASK: u64 = (1u64 << LANE_BITS) - 1;
const LANE_OFFSETS: [usize; 5] = [0, 50, 100, 150, 200];

/// A voter command: either a vote or a key change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Position in the registration tree.
    pub state_index: u64,
    /// Chosen vote option; zero for key changes.
    pub vote_option_index: u64,
    /// New vote weight; zero for key changes.
    pub new_vote_weight: u64,
    /// Shared protocol nonce (votes and key changes, one counter).
    pub nonce: u64,
    /// Poll the command targets.
    pub poll_id: u64,
}

impl Command {
    /// A plain vote command.
    pub fn for_vote(
        state_index: u64,
        vote_option_index: u64,
        new_vote_weight: u64,
        nonce: u64,
        poll_id: u64,
    ) -> Self {
        Self {
            state_index,
            vote_option_index,
            new_vote_weight,
            nonce,
            poll_id,
        }
    }

    /// A key-change command: vote lanes pinned to zero.
    pub fn for_key_change(state_index: u64, nonce: u64, poll_id: u64) -> Self {
        Self {
            state_index,
            vote_option_index: 0,
            new_vote_weight: 0,
            nonce,
            poll_id,
        }
    }

    fn lanes(&self) -> [u64; 5] {
        [
            self.state_index,
            self.vote_option_index,
            self.new_vote_weight,
            self.nonce,
            self.poll_id,
        ]
    }

    /// Pack into a single field element. `Range` if any lane needs more
    /// than 50 bits.
    pub fn pack(&self) -> Result<F> {
        for (lane, value) in ["stateIndex", "voteOptionIndex", "newVoteWeight", "nonce", "pollId"]
            .iter()
            .zip(self.lanes())
        {
            if value > LANE_MASK {
                return Err(Error::Range(format!(
                    "command field {lane} does not fit in {LANE_BITS} bits: {value}"
                )));
            }
        }

        let shift = F::from(1u64 << LANE_BITS);
        let mut acc = F::from(0u64);
        for value in self.lanes().iter().rev() {
            acc = acc * shift + F::from(*value);
        }
        Ok(acc)
    }

    /// Unpack a field element into its five lanes. Residue above bit
    /// 250 means the value was not produced by [`Command::pack`] and is
    /// refused.
    pub fn unpack(packed: &F) -> Result<Self> {
        let limbs: [u64; 4] = packed.into_bigint().0;
        if limbs[3] >> 58 != 0 {
            return Err(Error::Range(
                "packed command has residue above bit 250".into(),
            ));
        }
        let lanes: Vec<u64> = LANE_OFFSETS.iter().map(|&lo| window(&limbs, lo)).collect();
        Ok(Self {
            state_index: lanes[0],
            vote_option_index: lanes[1],
            new_vote_weight: lanes[2],
            nonce: lanes[3],
            poll_id: lanes[4],
        })
    }

    /// Ingest-side validation: a processed command must carry the full
    /// lane layout, which in particular means a live nonce.
    pub fn validate_full_layout(&self) -> Result<()> {
        if self.nonce == 0 {
            return Err(Error::Range(
                "command carries a zero nonce (short-form packing is not accepted)".into(),
            ));
        }
        Ok(())
    }
}

/// Extract the 50-bit window starting at bit `lo` from little-endian
/// limbs.
fn window(limbs: &[u64; 4], lo: usize) -> u64 {
    let limb = lo / 64;
    let offset = lo % 64;
    let mut value = limbs[limb] >> offset;
    if offset + (LANE_BITS as usize) > 64 {
        value |= limbs[limb + 1] << (64 - offset);
    }
    value & LANE_MASK
}

/// `Poseidon(packed, newPk.x, newPk.y, salt)` — the element that gets
/// signed. `new_pk` is the key the command switches to; for plain votes
/// it equals the voter's current bound key.
pub fn command_hash(packed: F, new_pk: &Point, salt: F) -> Result<F> {
    poseidon::hash_n(&[packed, new_pk.x, new_pk.y, salt])
}

/// Draw a fresh salt: 31 random bytes reduced little-endian into the
/// field, so the result is always canonical.
pub fn random_salt<R: RngCore + ?Sized>(rng: &mut R) -> F {
    let mut bytes = [0u8; 31];
    rng.fill_bytes(&mut bytes);
    salt_from_bytes(&bytes)
}
