//! Poll parameters handed in by the external collaborator.
//!
//! A `ProposalDescriptor` is read-only to the core: it carries the
//! addresses and limits the message pipeline validates against. The
//! coordinator key is checked into the prime-order subgroup at
//! construction and again after deserialisation, so a descriptor that
//! exists is safe to encrypt to.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::curve::{self, point_serde, Point};
use crate::error::Result;

/// Parameters of one poll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalDescriptor {
    /// Address of the poll contract messages are published to.
    pub poll_address: String,
    /// Poll identifier within the deployment.
    pub poll_id: u64,
    /// The coordinator's public key; every message is encrypted to it.
    #[serde(with = "point_serde")]
    pub coordinator_public_key: Point,
    /// Number of vote options (a binary poll has 2).
    pub vote_options: u64,
    /// Per-voter voice-credit budget; the quadratic cost of a vote must
    /// stay within it.
    pub voice_credit_budget: u64,
    /// Depth of the on-chain message tree. Informational for this core.
    pub message_tree_depth: u8,
    /// Voting deadline as a unix timestamp, if the deployment exposes
    /// one. Informational: closing is driven by an explicit signal, not
    /// by the clock.
    pub deadline: Option<u64>,
}

impl ProposalDescriptor {
    /// Build a descriptor, validating the coordinator key.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        poll_address: impl Into<String>,
        poll_id: u64,
        coordinator_public_key: Point,
        vote_options: u64,
        voice_credit_budget: u64,
        message_tree_depth: u8,
        deadline: Option<u64>,
    ) -> Result<Self> {
        curve::assert_subgroup(&coordinator_public_key)?;
        Ok(Self {
            poll_address: poll_address.into(),
            poll_id,
            coordinator_public_key,
            vote_options,
            voice_credit_budget,
            message_tree_depth,
            deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;
    use crate::F;

    #[test]
    fn construction_validates_the_coordinator_key() {
        let coordinator = Keypair::from_seed([0x02; 32]);
        let ok = ProposalDescriptor::new("0xpoll", 0, coordinator.pk, 2, 35, 10, None);
        assert!(ok.is_ok());

        let junk = Point::new_unchecked(F::from(1u64), F::from(1u64));
        assert!(ProposalDescriptor::new("0xpoll", 0, junk, 2, 35, 10, None).is_err());
    }

    #[test]
    fn serde_round_trip_revalidates_the_key() {
        let coordinator = Keypair::from_seed([0x02; 32]);
        let proposal =
            ProposalDescriptor::new("0xpoll", 1, coordinator.pk, 2, 100, 10, Some(1_700_000_000))
                .unwrap();
        let json = serde_json::to_string(&proposal).unwrap();
        let back: ProposalDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.coordinator_public_key, proposal.coordinator_public_key);
        assert_eq!(back.poll_id, 1);

        // Corrupting a coordinate must fail deserialisation, not yield
        // a bogus point.
        let bad = json.replace(
            &crate::curve::point_to_dec(&coordinator.pk).0,
            "12345",
        );
        assert!(serde_json::from_str::<ProposalDescriptor>(&bad).is_err());
    }
}
