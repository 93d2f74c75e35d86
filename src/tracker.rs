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

use std::collections::HashMap;

use crate::block::{BlockHash, BlockNumber};
use crate::chain::Chain;
use crate::voting::{Signature, Vote, VoterId, VoterSet, VoterWeight};

/// Votes seen from a single voter in one phase of one round.
///
/// The first vote counts towards the tally. A second, distinct vote is an
/// equivocation: both votes are retained as evidence, the voter's weight is
/// excluded from the tally from then on, and further votes are dropped.
#[derive(Clone, Debug)]
pub enum VoteMultiplicity<V> {
	Single(V, Signature),
	Equivocated((V, Signature), (V, Signature)),
}

impl<V: Vote> VoteMultiplicity<V> {
	fn contains(&self, vote: &V, signature: &Signature) -> bool {
		match self {
			VoteMultiplicity::Single(v, s) => v == vote && s == signature,
			VoteMultiplicity::Equivocated((v1, s1), (v2, s2)) => {
				v1 == vote && s1 == signature || v2 == vote && s2 == signature
			}
		}
	}
}

/// Outcome of handing a vote to the tracker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteImport<V> {
	/// First vote from this voter in this phase.
	Counted,
	/// Exact duplicate of a vote already seen, dropped.
	Duplicate,
	/// Second distinct vote: both signed votes, first-seen first.
	Equivocated((V, Signature), (V, Signature)),
	/// Third or later distinct vote from a known equivocator, dropped.
	Ignored,
}

/// Per-round, per-phase vote accumulator.
#[derive(Clone, Debug)]
pub struct VoteTracker<V> {
	votes: HashMap<VoterId, VoteMultiplicity<V>>,
	// Weight of every voter heard from, equivocators included.
	participating_weight: VoterWeight,
	// Weight of equivocating voters, excluded from all block tallies.
	equivocated_weight: VoterWeight,
}

impl<V: Vote> VoteTracker<V> {
	pub fn new() -> Self {
		Self {
			votes: HashMap::new(),
			participating_weight: 0,
			equivocated_weight: 0,
		}
	}

	pub fn add_vote(
		&mut self,
		id: VoterId,
		vote: V,
		signature: Signature,
		weight: VoterWeight,
	) -> VoteImport<V> {
		match self.votes.entry(id) {
			std::collections::hash_map::Entry::Vacant(vacant) => {
				self.participating_weight += weight;
				vacant.insert(VoteMultiplicity::Single(vote, signature));
				VoteImport::Counted
			}
			std::collections::hash_map::Entry::Occupied(mut occupied) => {
				if occupied.get().contains(&vote, &signature) {
					return VoteImport::Duplicate;
				}

				match occupied.get().clone() {
					VoteMultiplicity::Single(first_vote, first_signature) => {
						// The same vote re-signed is a re-broadcast, not an
						// equivocation.
						if first_vote == vote {
							return VoteImport::Duplicate;
						}
						self.equivocated_weight += weight;
						let first = (first_vote, first_signature);
						let second = (vote, signature);
						occupied.insert(VoteMultiplicity::Equivocated(
							first.clone(),
							second.clone(),
						));
						VoteImport::Equivocated(first, second)
					}
					VoteMultiplicity::Equivocated(..) => VoteImport::Ignored,
				}
			}
		}
	}

	/// Weight of all voters heard from, equivocators included. Used for
	/// "how much weight is still outstanding" computations.
	pub fn participating_weight(&self) -> VoterWeight {
		self.participating_weight
	}

	pub fn equivocated_weight(&self) -> VoterWeight {
		self.equivocated_weight
	}

	pub fn has_voted(&self, id: &VoterId) -> bool {
		self.votes.contains_key(id)
	}

	/// Votes that count towards the tally: the single vote of every
	/// non-equivocating voter.
	pub fn counted(&self) -> impl Iterator<Item = (&VoterId, &V, &Signature)> {
		self.votes.iter().filter_map(|(id, multiplicity)| match multiplicity {
			VoteMultiplicity::Single(vote, signature) => Some((id, vote, signature)),
			VoteMultiplicity::Equivocated(..) => None,
		})
	}

	/// Every imported vote, including both votes of equivocators. Evidence
	/// and catch-up material, not tally input.
	pub fn votes(&self) -> Vec<(VoterId, V, Signature)> {
		let mut all = Vec::new();
		for (id, multiplicity) in &self.votes {
			match multiplicity {
				VoteMultiplicity::Single(v, s) => all.push((id.clone(), v.clone(), s.clone())),
				VoteMultiplicity::Equivocated((v1, s1), (v2, s2)) => {
					all.push((id.clone(), v1.clone(), s1.clone()));
					all.push((id.clone(), v2.clone(), s2.clone()));
				}
			}
		}
		all
	}

	/// Cumulative weight per block: each counted vote contributes its
	/// voter's weight to the target and every ancestor back to `base`.
	/// Votes whose target fell out of the chain oracle are skipped.
	pub fn cumulative_weights<C: Chain>(
		&self,
		voters: &VoterSet,
		base: BlockHash,
		chain: &C,
	) -> HashMap<BlockHash, VoterWeight> {
		let mut weights: HashMap<BlockHash, VoterWeight> = HashMap::new();
		for (id, vote, _) in self.counted() {
			let weight = match voters.weight_of(id) {
				Some(weight) => weight,
				None => continue,
			};
			if let Ok(path) = chain.ancestry(base, vote.target_hash()) {
				for block in path {
					*weights.entry(block).or_insert(0) += weight;
				}
			}
		}
		weights
	}
}

impl<V: Vote> Default for VoteTracker<V> {
	fn default() -> Self {
		Self::new()
	}
}

/// GHOST rule over a cumulative weight map: the block with the highest
/// number whose supporting weight meets `min_weight`. Two incomparable
/// blocks can never both meet a supermajority threshold, so taking the
/// highest-numbered qualifying block walks the heaviest subtree.
pub fn ghost<C: Chain>(
	weights: &HashMap<BlockHash, VoterWeight>,
	min_weight: VoterWeight,
	chain: &C,
) -> Option<(BlockHash, BlockNumber)> {
	weights
		.iter()
		.filter(|(_, weight)| **weight >= min_weight)
		.filter_map(|(hash, _)| chain.block_number(*hash).map(|number| (*hash, number)))
		.max_by_key(|(hash, number)| (*number, *hash))
}
