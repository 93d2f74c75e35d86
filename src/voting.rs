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

use parity_scale_codec::{Decode, Encode};
use std::fmt::{Display, Formatter};

use crate::block::{BlockHash, BlockNumber};
use crate::error::Error;

pub type RoundNumber = u64;
pub type SetId = u64;
pub type VoterId = String;
pub type VoterWeight = u64;

/// A signature as produced by the external signature oracle. Opaque bytes,
/// only ever checked through the oracle again.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Signature(pub Vec<u8>);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Phase {
	Prevote,
	Precommit,
}

impl Display for Phase {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Phase::Prevote => write!(f, "prevote"),
			Phase::Precommit => write!(f, "precommit"),
		}
	}
}

/// First-phase vote for the head of the voter's preferred chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Prevote {
	pub target_hash: BlockHash,
	pub target_number: BlockNumber,
}

impl Prevote {
	pub fn new(target_hash: BlockHash, target_number: BlockNumber) -> Self {
		Self {
			target_hash,
			target_number,
		}
	}
}

/// Second-phase vote confirming the prevote-derived outcome of the round.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Precommit {
	pub target_hash: BlockHash,
	pub target_number: BlockNumber,
}

impl Precommit {
	pub fn new(target_hash: BlockHash, target_number: BlockNumber) -> Self {
		Self {
			target_hash,
			target_number,
		}
	}
}

/// Estimate hint broadcast by the primary voter of a round before prevoting
/// begins. Never counted as a vote.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub struct PrimaryPropose {
	pub target_hash: BlockHash,
	pub target_number: BlockNumber,
}

impl Display for Prevote {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "Prevote({}, {})", self.target_hash, self.target_number)
	}
}

impl Display for Precommit {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "Precommit({}, {})", self.target_hash, self.target_number)
	}
}

/// A vote counted by the tracker. Implemented by both phases so the tracker
/// and the GHOST computation can be shared between them.
pub trait Vote: Clone + Eq + std::hash::Hash {
	const PHASE: Phase;

	fn target_hash(&self) -> BlockHash;

	fn target_number(&self) -> BlockNumber;
}

impl Vote for Prevote {
	const PHASE: Phase = Phase::Prevote;

	fn target_hash(&self) -> BlockHash {
		self.target_hash
	}

	fn target_number(&self) -> BlockNumber {
		self.target_number
	}
}

impl Vote for Precommit {
	const PHASE: Phase = Phase::Precommit;

	fn target_hash(&self) -> BlockHash {
		self.target_hash
	}

	fn target_number(&self) -> BlockNumber {
		self.target_number
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Message {
	Prevote(Prevote),
	Precommit(Precommit),
	PrimaryPropose(PrimaryPropose),
}

impl Message {
	pub fn target(&self) -> (BlockHash, BlockNumber) {
		match self {
			Message::Prevote(prevote) => (prevote.target_hash, prevote.target_number),
			Message::Precommit(precommit) => (precommit.target_hash, precommit.target_number),
			Message::PrimaryPropose(propose) => (propose.target_hash, propose.target_number),
		}
	}
}

/// A vote message as it travels over the wire. The signature covers the
/// SCALE encoding of `(message, round_number, set_id)`, so a vote can never
/// be replayed into another round or authority set.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SignedMessage {
	pub message: Message,
	pub round_number: RoundNumber,
	pub set_id: SetId,
	pub id: VoterId,
	pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SignedPrevote {
	pub prevote: Prevote,
	pub id: VoterId,
	pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SignedPrecommit {
	pub precommit: Precommit,
	pub id: VoterId,
	pub signature: Signature,
}

/// Encode a round message localized to the given round and set id. This is
/// the exact payload handed to the signature oracle.
pub fn localized_payload(
	round_number: RoundNumber,
	set_id: SetId,
	message: &Message,
) -> Vec<u8> {
	(message, round_number, set_id).encode()
}

/// The weighted authority membership of a single set id. Immutable once a
/// round has started; rotation swaps in a whole new set.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct VoterSet {
	voters: Vec<(VoterId, VoterWeight)>,
	total_weight: VoterWeight,
}

impl VoterSet {
	pub fn new<I>(voters: I) -> Result<Self, Error>
	where
		I: IntoIterator<Item = (VoterId, VoterWeight)>,
	{
		let mut seen = std::collections::HashSet::new();
		let mut list = Vec::new();
		for (id, weight) in voters {
			if weight == 0 || !seen.insert(id.clone()) {
				return Err(Error::EmptyVoterSet);
			}
			list.push((id, weight));
		}
		let total_weight = list.iter().map(|(_, w)| w).sum();
		if total_weight == 0 {
			return Err(Error::EmptyVoterSet);
		}
		Ok(Self {
			voters: list,
			total_weight,
		})
	}

	pub fn contains(&self, id: &VoterId) -> bool {
		self.voters.iter().any(|(v, _)| v == id)
	}

	pub fn weight_of(&self, id: &VoterId) -> Option<VoterWeight> {
		self.voters
			.iter()
			.find(|(v, _)| v == id)
			.map(|(_, weight)| *weight)
	}

	pub fn total_weight(&self) -> VoterWeight {
		self.total_weight
	}

	/// Supermajority threshold: strictly more than 2/3 of the total weight,
	/// in exact integer arithmetic.
	pub fn threshold(&self) -> VoterWeight {
		self.total_weight - (self.total_weight - 1) / 3
	}

	pub fn len(&self) -> usize {
		self.voters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.voters.is_empty()
	}

	/// The primary voter of a round, a deterministic function of the set and
	/// the round number.
	pub fn primary(&self, round_number: RoundNumber) -> &VoterId {
		let index = (round_number % self.voters.len() as u64) as usize;
		&self.voters[index].0
	}

	pub fn iter(&self) -> impl Iterator<Item = &(VoterId, VoterWeight)> {
		self.voters.iter()
	}
}
