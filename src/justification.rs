// Copyright (C) 2021 Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use itertools::Itertools;
use parity_scale_codec::{Decode, Encode};

use crate::block::{BlockHash, BlockNumber};
use crate::chain::Chain;
use crate::crypto::SignatureOracle;
use crate::error::Error;
use crate::round::Round;
use crate::voting::{
	localized_payload, Message, RoundNumber, SetId, SignedPrecommit, VoterSet,
};

/// The signed evidence set proving a block final: enough precommits from one
/// round to clear the supermajority threshold, each targeting the block or a
/// descendant of it.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Justification {
	pub round_number: RoundNumber,
	pub set_id: SetId,
	pub target_hash: BlockHash,
	pub target_number: BlockNumber,
	pub precommits: Vec<SignedPrecommit>,
}

impl Justification {
	/// Package the finalized block of a completed round. Selects a minimal
	/// sufficient precommit set, heaviest voters first.
	pub fn build<C: Chain>(round: &Round, chain: &C) -> Result<Self, Error> {
		let (target_hash, target_number) = round
			.finalized()
			.ok_or(Error::NotFinalized(round.number()))?;
		let voters = round.voters();
		let threshold = voters.threshold();

		let candidates = round
			.finalizing_precommits(chain)
			.unwrap_or_default()
			.into_iter()
			.sorted_by_key(|signed| {
				let weight = voters.weight_of(&signed.id).unwrap_or(0);
				(std::cmp::Reverse(weight), signed.id.clone())
			});

		let mut precommits = Vec::new();
		let mut weight = 0;
		for signed in candidates {
			if weight >= threshold {
				break;
			}
			weight += voters.weight_of(&signed.id).unwrap_or(0);
			precommits.push(signed);
		}

		if weight < threshold {
			return Err(Error::InsufficientWeight {
				got: weight,
				threshold,
			});
		}

		Ok(Self {
			round_number: round.number(),
			set_id: round.set_id(),
			target_hash,
			target_number,
			precommits,
		})
	}

	/// Validate the justification against an authority set: set id, one vote
	/// per voter, every signature, every descendancy, aggregate weight.
	pub fn verify<C: Chain, S: SignatureOracle>(
		&self,
		voters: &VoterSet,
		set_id: SetId,
		chain: &C,
		oracle: &S,
	) -> Result<(), Error> {
		if self.set_id != set_id {
			return Err(Error::WrongSetId {
				got: self.set_id,
				expected: set_id,
			});
		}

		if let Some(id) = self
			.precommits
			.iter()
			.map(|signed| &signed.id)
			.duplicates()
			.next()
		{
			return Err(Error::DuplicateVoter(id.clone()));
		}

		let mut weight = 0;
		for signed in &self.precommits {
			let voter_weight = voters
				.weight_of(&signed.id)
				.ok_or_else(|| Error::UnknownVoter(signed.id.clone()))?;

			let payload = localized_payload(
				self.round_number,
				self.set_id,
				&Message::Precommit(signed.precommit.clone()),
			);
			if !oracle.verify(&payload, &signed.signature, &signed.id) {
				return Err(Error::InvalidSignature(signed.id.clone()));
			}

			if !chain.is_equal_or_descendant(self.target_hash, signed.precommit.target_hash) {
				return Err(Error::DescendantCheckFailed(
					signed.precommit.target_hash,
					self.target_hash,
				));
			}

			weight += voter_weight;
		}

		let threshold = voters.threshold();
		if weight < threshold {
			return Err(Error::InsufficientWeight {
				got: weight,
				threshold,
			});
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::round::{Round, RoundParams};
	use crate::testing::{forked_tree, hash, TestSigner};
	use crate::voting::{Precommit, Prevote, Signature, SignedMessage, VoterId};

	fn voters() -> VoterSet {
		VoterSet::new(
			["Alice", "Bob", "Carol", "Dave"]
				.iter()
				.map(|id| (id.to_string(), 1)),
		)
		.unwrap()
	}

	fn signer() -> TestSigner {
		TestSigner::new(["Alice", "Bob", "Carol", "Dave"])
	}

	fn signed(signer: &TestSigner, id: &str, message: Message) -> SignedMessage {
		let payload = localized_payload(1, 0, &message);
		let signature = signer.sign(&payload, &id.to_string()).unwrap();
		SignedMessage {
			message,
			round_number: 1,
			set_id: 0,
			id: id.to_string(),
			signature,
		}
	}

	fn completed_round(ids: &[&str]) -> Round {
		let tree = forked_tree();
		let signer = signer();
		let mut round = Round::new(RoundParams {
			round_number: 1,
			set_id: 0,
			voters: voters(),
			base: (hash("0"), 0),
			started_at: 0,
		});
		for id in ids {
			round
				.import(
					&tree,
					&signer,
					signed(&signer, id, Message::Prevote(Prevote::new(hash("4"), 4))),
				)
				.unwrap();
			round
				.import(
					&tree,
					&signer,
					signed(&signer, id, Message::Precommit(Precommit::new(hash("4"), 4))),
				)
				.unwrap();
		}
		round
	}

	#[test]
	fn round_trip() {
		let tree = forked_tree();
		let round = completed_round(&["Alice", "Bob", "Carol"]);
		let justification = Justification::build(&round, &tree).unwrap();
		assert_eq!(justification.target_hash, hash("4"));
		assert_eq!(justification.precommits.len(), 3);
		justification
			.verify(&voters(), 0, &tree, &signer())
			.unwrap();
	}

	#[test]
	fn build_selects_minimal_sufficient_subset() {
		let tree = forked_tree();
		let round = completed_round(&["Alice", "Bob", "Carol", "Dave"]);
		let justification = Justification::build(&round, &tree).unwrap();
		// Threshold is 3, so one of the four precommits is left out.
		assert_eq!(justification.precommits.len(), 3);
		justification
			.verify(&voters(), 0, &tree, &signer())
			.unwrap();
	}

	#[test]
	fn tampered_signature_is_rejected() {
		let tree = forked_tree();
		let round = completed_round(&["Alice", "Bob", "Carol"]);
		let mut justification = Justification::build(&round, &tree).unwrap();
		justification.precommits[1].signature = Signature(vec![0xde, 0xad]);
		let id: VoterId = justification.precommits[1].id.clone();
		assert_eq!(
			justification.verify(&voters(), 0, &tree, &signer()),
			Err(Error::InvalidSignature(id)),
		);
	}

	#[test]
	fn half_weight_is_insufficient() {
		// 2 of 4 equal weights is 50%, below the 2/3 threshold.
		let tree = forked_tree();
		let signer = signer();
		let round = completed_round(&["Alice", "Bob", "Carol"]);
		let mut justification = Justification::build(&round, &tree).unwrap();
		justification.precommits.truncate(2);
		assert_eq!(
			justification.verify(&voters(), 0, &tree, &signer),
			Err(Error::InsufficientWeight {
				got: 2,
				threshold: 3,
			}),
		);
	}

	#[test]
	fn duplicate_voter_is_rejected() {
		let tree = forked_tree();
		let round = completed_round(&["Alice", "Bob", "Carol"]);
		let mut justification = Justification::build(&round, &tree).unwrap();
		let duplicate = justification.precommits[0].clone();
		justification.precommits.push(duplicate);
		assert_eq!(
			justification.verify(&voters(), 0, &tree, &signer()),
			Err(Error::DuplicateVoter(justification.precommits[0].id.clone())),
		);
	}

	#[test]
	fn precommit_off_the_finalized_chain_is_rejected() {
		let tree = forked_tree();
		let round = completed_round(&["Alice", "Bob", "Carol"]);
		let mut justification = Justification::build(&round, &tree).unwrap();
		// Re-sign a precommit for the other fork: signature is valid but the
		// target does not descend from the justified block.
		let rogue = Precommit::new(hash("8"), 5);
		let payload = localized_payload(1, 0, &Message::Precommit(rogue.clone()));
		justification.precommits[0].precommit = rogue;
		justification.precommits[0].signature = signer()
			.sign(&payload, &justification.precommits[0].id)
			.unwrap();
		assert_eq!(
			justification.verify(&voters(), 0, &tree, &signer()),
			Err(Error::DescendantCheckFailed(hash("8"), hash("4"))),
		);
	}

	#[test]
	fn wrong_set_id_is_rejected() {
		let tree = forked_tree();
		let round = completed_round(&["Alice", "Bob", "Carol"]);
		let justification = Justification::build(&round, &tree).unwrap();
		assert_eq!(
			justification.verify(&voters(), 1, &tree, &signer()),
			Err(Error::WrongSetId {
				got: 0,
				expected: 1,
			}),
		);
	}
}
