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

use log::{debug, warn};

use crate::block::{BlockHash, BlockNumber};
use crate::chain::Chain;
use crate::crypto::SignatureOracle;
use crate::error::Error;
use crate::tracker::{ghost, VoteImport, VoteTracker};
use crate::voting::{
	localized_payload, Message, Phase, Precommit, Prevote, PrimaryPropose, RoundNumber, SetId,
	Signature, SignedMessage, SignedPrecommit, SignedPrevote, Vote, VoterId, VoterSet,
};

/// Logical clock driven by the embedding event loop. Round timeouts are
/// expressed as tick deltas, not wall time.
pub type Tick = u64;

/// Voting timeouts, in ticks from round start.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
	/// How long a non-primary voter waits for a primary proposal.
	pub propose_wait: Tick,
	/// After this the voter prevotes for the previous round estimate chain
	/// even without a proposal.
	pub prevote_timeout: Tick,
	/// After this the voter precommits to the previous round estimate even
	/// without a prevote-GHOST.
	pub precommit_timeout: Tick,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			propose_wait: 2,
			prevote_timeout: 8,
			precommit_timeout: 16,
		}
	}
}

/// Lifecycle of a round as seen by this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
	Start,
	Prevoting,
	Precommitting,
	Completable,
	Concluded,
}

impl std::fmt::Display for Stage {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		let name = match self {
			Stage::Start => "start",
			Stage::Prevoting => "prevoting",
			Stage::Precommitting => "precommitting",
			Stage::Completable => "completable",
			Stage::Concluded => "concluded",
		};
		write!(f, "{}", name)
	}
}

/// Both signed votes of an equivocation, kept as evidence for a slashing
/// pipeline. The first-seen vote is the one that counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivocationEvidence {
	pub round_number: RoundNumber,
	pub set_id: SetId,
	pub phase: Phase,
	pub id: VoterId,
	pub first: (Message, Signature),
	pub second: (Message, Signature),
}

/// Outcome of importing a signed message into a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportOutcome {
	Accepted,
	/// Exact duplicate or a vote that can no longer influence the round
	/// (e.g. a third vote from a known equivocator, or a proposal from a
	/// non-primary voter).
	Ignored,
	Equivocation(EquivocationEvidence),
}

/// Derived state of a round, recomputed from the full vote set after every
/// import so that arrival order never matters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundState {
	pub prevote_ghost: Option<(BlockHash, BlockNumber)>,
	pub finalized: Option<(BlockHash, BlockNumber)>,
	pub estimate: Option<(BlockHash, BlockNumber)>,
	pub completable: bool,
}

pub struct RoundParams {
	pub round_number: RoundNumber,
	pub set_id: SetId,
	pub voters: VoterSet,
	pub base: (BlockHash, BlockNumber),
	pub started_at: Tick,
}

/// A single voting round: vote accumulation for both phases plus the local
/// voter's progression through them.
pub struct Round {
	round_number: RoundNumber,
	set_id: SetId,
	voters: VoterSet,
	base: (BlockHash, BlockNumber),
	started_at: Tick,

	prevotes: VoteTracker<Prevote>,
	precommits: VoteTracker<Precommit>,
	// All imported votes in arrival order, for catch-up material.
	historical_votes: Vec<SignedMessage>,
	primary_proposal: Option<(BlockHash, BlockNumber)>,

	prevote_ghost: Option<(BlockHash, BlockNumber)>,
	finalized: Option<(BlockHash, BlockNumber)>,
	estimate: Option<(BlockHash, BlockNumber)>,
	completable: bool,
	concluded: bool,

	// What this node broadcast, if it is a voter.
	cast_proposal: bool,
	cast_prevote: Option<Prevote>,
	cast_precommit: Option<Precommit>,
}

impl Round {
	pub fn new(params: RoundParams) -> Self {
		Self {
			round_number: params.round_number,
			set_id: params.set_id,
			voters: params.voters,
			base: params.base,
			started_at: params.started_at,
			prevotes: VoteTracker::new(),
			precommits: VoteTracker::new(),
			historical_votes: Vec::new(),
			primary_proposal: None,
			prevote_ghost: None,
			finalized: None,
			estimate: None,
			completable: false,
			concluded: false,
			cast_proposal: false,
			cast_prevote: None,
			cast_precommit: None,
		}
	}

	pub fn number(&self) -> RoundNumber {
		self.round_number
	}

	pub fn set_id(&self) -> SetId {
		self.set_id
	}

	pub fn base(&self) -> (BlockHash, BlockNumber) {
		self.base
	}

	pub fn voters(&self) -> &VoterSet {
		&self.voters
	}

	pub fn threshold(&self) -> u64 {
		self.voters.threshold()
	}

	pub fn state(&self) -> RoundState {
		RoundState {
			prevote_ghost: self.prevote_ghost,
			finalized: self.finalized,
			estimate: self.estimate,
			completable: self.completable,
		}
	}

	pub fn finalized(&self) -> Option<(BlockHash, BlockNumber)> {
		self.finalized
	}

	pub fn estimate(&self) -> Option<(BlockHash, BlockNumber)> {
		self.estimate
	}

	pub fn prevote_ghost(&self) -> Option<(BlockHash, BlockNumber)> {
		self.prevote_ghost
	}

	pub fn completable(&self) -> bool {
		self.completable
	}

	pub fn stage(&self) -> Stage {
		if self.concluded {
			Stage::Concluded
		} else if self.completable {
			Stage::Completable
		} else if self.prevote_ghost.is_some() {
			Stage::Precommitting
		} else if self.prevotes.participating_weight() > 0 || self.cast_prevote.is_some() {
			Stage::Prevoting
		} else {
			Stage::Start
		}
	}

	/// Retire the round. Only the finality engine calls this, once two later
	/// rounds have completed or the authority set rotated.
	pub fn conclude(&mut self) {
		self.concluded = true;
	}

	pub fn concluded(&self) -> bool {
		self.concluded
	}

	pub fn prevote_participation(&self) -> (u64, u64) {
		(
			self.prevotes.participating_weight(),
			self.voters.total_weight(),
		)
	}

	pub fn precommit_participation(&self) -> (u64, u64) {
		(
			self.precommits.participating_weight(),
			self.voters.total_weight(),
		)
	}

	/// Import a signed vote message. Authentication and protocol errors are
	/// returned to the caller and the message is dropped; equivocations are
	/// non-fatal and reported in the outcome.
	pub fn import<C: Chain, S: SignatureOracle>(
		&mut self,
		chain: &C,
		oracle: &S,
		msg: SignedMessage,
	) -> Result<ImportOutcome, Error> {
		if msg.round_number != self.round_number {
			return Err(Error::WrongRound {
				got: msg.round_number,
				expected: self.round_number,
			});
		}
		if msg.set_id != self.set_id {
			return Err(Error::WrongSetId {
				got: msg.set_id,
				expected: self.set_id,
			});
		}
		let weight = self
			.voters
			.weight_of(&msg.id)
			.ok_or_else(|| Error::UnknownVoter(msg.id.clone()))?;

		let payload = localized_payload(self.round_number, self.set_id, &msg.message);
		if !oracle.verify(&payload, &msg.signature, &msg.id) {
			return Err(Error::BadSignature(msg.id));
		}

		// The vote target must be known and must extend the round base.
		let (target_hash, _) = msg.message.target();
		chain.ancestry(self.base.0, target_hash)?;

		let outcome = match msg.message.clone() {
			Message::PrimaryPropose(propose) => {
				if &msg.id != self.voters.primary(self.round_number) {
					debug!(
						target: "finality",
						"round {}: dropping primary proposal from non-primary {}",
						self.round_number, msg.id,
					);
					return Ok(ImportOutcome::Ignored);
				}
				self.primary_proposal = Some((propose.target_hash, propose.target_number));
				ImportOutcome::Accepted
			}
			Message::Prevote(prevote) => {
				let import = self
					.prevotes
					.add_vote(msg.id.clone(), prevote, msg.signature.clone(), weight);
				self.outcome_of(import, &msg)
			}
			Message::Precommit(precommit) => {
				let import =
					self.precommits
						.add_vote(msg.id.clone(), precommit, msg.signature.clone(), weight);
				self.outcome_of(import, &msg)
			}
		};

		if !matches!(outcome, ImportOutcome::Ignored) {
			self.historical_votes.push(msg);
		}
		self.update(chain);
		Ok(outcome)
	}

	fn outcome_of<V: Vote>(&self, import: VoteImport<V>, msg: &SignedMessage) -> ImportOutcome
	where
		Message: From<V>,
	{
		match import {
			VoteImport::Counted => ImportOutcome::Accepted,
			VoteImport::Duplicate | VoteImport::Ignored => ImportOutcome::Ignored,
			VoteImport::Equivocated((v1, s1), (v2, s2)) => {
				warn!(
					target: "finality",
					"round {}: {} equivocation by {}",
					self.round_number, V::PHASE, msg.id,
				);
				ImportOutcome::Equivocation(EquivocationEvidence {
					round_number: self.round_number,
					set_id: self.set_id,
					phase: V::PHASE,
					id: msg.id.clone(),
					first: (Message::from(v1), s1),
					second: (Message::from(v2), s2),
				})
			}
		}
	}

	// Recompute prevote-GHOST, finalized block, estimate and completability
	// from the full accumulated vote set.
	fn update<C: Chain>(&mut self, chain: &C) {
		let threshold = self.voters.threshold();
		let total = self.voters.total_weight();

		let prevote_weights = self
			.prevotes
			.cumulative_weights(&self.voters, self.base.0, chain);
		self.prevote_ghost = ghost(&prevote_weights, threshold, chain);

		let (ghost_hash, _) = match self.prevote_ghost {
			Some(g) => g,
			None => {
				self.finalized = None;
				self.estimate = None;
				self.completable = false;
				return;
			}
		};

		let precommit_weights = self
			.precommits
			.cumulative_weights(&self.voters, self.base.0, chain);
		let weight_at = |hash: &BlockHash| precommit_weights.get(hash).copied().unwrap_or(0);

		// Path from the prevote-GHOST down to the base; the GHOST is a
		// descendant of the base by construction.
		let path = match chain.ancestry(self.base.0, ghost_hash) {
			Ok(path) => path,
			Err(_) => return,
		};
		let with_number = |hash: BlockHash| chain.block_number(hash).map(|n| (hash, n));

		// The finalized block is the precommit-GHOST: the highest block up
		// to the prevote-GHOST with a precommit supermajority.
		self.finalized = if self.precommits.participating_weight() >= threshold {
			path.iter()
				.find(|&hash| weight_at(hash) >= threshold)
				.and_then(|hash| with_number(*hash))
		} else {
			None
		};

		// Weight that could still land on any given block: its current
		// precommit weight plus everything unheard from. Equivocated weight
		// counts for no block at all.
		let remaining = total - self.precommits.participating_weight();
		let possible = |hash: &BlockHash| weight_at(hash) + remaining;

		self.estimate = path
			.iter()
			.find(|&hash| possible(hash) >= threshold)
			.and_then(|hash| with_number(*hash));

		if self.precommits.participating_weight() < threshold {
			self.completable = false;
			return;
		}

		self.completable = match self.estimate {
			None => {
				warn!(
					target: "finality",
					"round {}: no valid estimate, finality stalled pending intervention",
					self.round_number,
				);
				false
			}
			Some((estimate_hash, _)) if estimate_hash != ghost_hash => true,
			Some(_) => {
				// Estimate and GHOST coincide: completable only if no block
				// above the GHOST can still reach a precommit supermajority.
				let best_descendant = precommit_weights
					.iter()
					.filter(|(hash, _)| chain.is_descendant(ghost_hash, **hash))
					.map(|(_, weight)| *weight)
					.max()
					.unwrap_or(0);
				best_descendant + remaining < threshold
			}
		};
	}

	/// Whether the round can no longer produce any estimate at all, i.e.
	/// more than a third of the weight equivocated in the precommit phase.
	pub fn safety_violated(&self) -> bool {
		let threshold = self.voters.threshold();
		let total = self.voters.total_weight();
		self.precommits.equivocated_weight() > total - threshold
			&& self.prevote_ghost.is_some()
			&& self.estimate.is_none()
	}

	/// Drive the local voter one step. Returns the signed messages to
	/// broadcast; the engine also imports them back into the round.
	pub fn poll_local<C: Chain, S: SignatureOracle>(
		&mut self,
		chain: &C,
		oracle: &S,
		local_id: &VoterId,
		previous_estimate: (BlockHash, BlockNumber),
		timeouts: &Timeouts,
		now: Tick,
	) -> Result<Vec<SignedMessage>, Error> {
		let mut out = Vec::new();
		if self.concluded || !self.voters.contains(local_id) {
			return Ok(out);
		}

		let is_primary = self.voters.primary(self.round_number) == local_id;

		if is_primary && !self.cast_proposal {
			self.cast_proposal = true;
			if let Some((hash, number)) = chain.best_chain_containing(previous_estimate.0) {
				let propose = PrimaryPropose {
					target_hash: hash,
					target_number: number,
				};
				out.push(self.sign(oracle, local_id, Message::PrimaryPropose(propose))?);
			}
		}

		if self.cast_prevote.is_none() {
			let waiting_for_primary = !is_primary
				&& self.primary_proposal.is_none()
				&& now < self.started_at + timeouts.propose_wait;

			if !waiting_for_primary {
				if let Some(target) =
					self.prevote_target(chain, previous_estimate, timeouts, now)
				{
					let prevote = Prevote::new(target.0, target.1);
					self.cast_prevote = Some(prevote.clone());
					out.push(self.sign(oracle, local_id, Message::Prevote(prevote))?);
				}
			}
		}

		if self.cast_prevote.is_some() && self.cast_precommit.is_none() {
			let target = match self.prevote_ghost {
				Some(ghost) => Some(ghost),
				// Timeout fallback: unblocks the local voter only, the
				// round itself stays open.
				None if now >= self.started_at + timeouts.precommit_timeout => {
					Some(previous_estimate)
				}
				None => None,
			};
			if let Some((hash, number)) = target {
				let precommit = Precommit::new(hash, number);
				self.cast_precommit = Some(precommit.clone());
				out.push(self.sign(oracle, local_id, Message::Precommit(precommit))?);
			}
		}

		Ok(out)
	}

	fn prevote_target<C: Chain>(
		&self,
		chain: &C,
		previous_estimate: (BlockHash, BlockNumber),
		timeouts: &Timeouts,
		now: Tick,
	) -> Option<(BlockHash, BlockNumber)> {
		// A primary proposal that extends the previous round estimate takes
		// precedence over our own view of the best chain.
		if let Some(proposal) = self.primary_proposal {
			if chain.is_equal_or_descendant(previous_estimate.0, proposal.0) {
				return Some(proposal);
			}
		}

		match chain.best_chain_containing(previous_estimate.0) {
			Some(best) => Some(best),
			None if now >= self.started_at + timeouts.prevote_timeout => Some(previous_estimate),
			None => None,
		}
	}

	fn sign<S: SignatureOracle>(
		&self,
		oracle: &S,
		id: &VoterId,
		message: Message,
	) -> Result<SignedMessage, Error> {
		let payload = localized_payload(self.round_number, self.set_id, &message);
		let signature = oracle.sign(&payload, id)?;
		Ok(SignedMessage {
			message,
			round_number: self.round_number,
			set_id: self.set_id,
			id: id.clone(),
			signature,
		})
	}

	/// The precommits backing this round's finalized block: one per
	/// non-equivocating voter whose target extends the finalized block.
	pub fn finalizing_precommits<C: Chain>(&self, chain: &C) -> Option<Vec<SignedPrecommit>> {
		let (finalized_hash, _) = self.finalized?;
		let precommits = self
			.precommits
			.counted()
			.filter(|(_, precommit, _)| {
				chain.is_equal_or_descendant(finalized_hash, precommit.target_hash)
			})
			.map(|(id, precommit, signature)| SignedPrecommit {
				precommit: precommit.clone(),
				id: id.clone(),
				signature: signature.clone(),
			})
			.collect();
		Some(precommits)
	}

	pub fn prevotes(&self) -> Vec<SignedPrevote> {
		self.prevotes
			.votes()
			.into_iter()
			.map(|(id, prevote, signature)| SignedPrevote {
				prevote,
				id,
				signature,
			})
			.collect()
	}

	pub fn precommits(&self) -> Vec<SignedPrecommit> {
		self.precommits
			.votes()
			.into_iter()
			.map(|(id, precommit, signature)| SignedPrecommit {
				precommit,
				id,
				signature,
			})
			.collect()
	}

	pub fn historical_votes(&self) -> &[SignedMessage] {
		&self.historical_votes
	}

	/// The votes this node itself has cast, for timeout re-broadcast.
	pub fn own_votes(&self, id: &VoterId) -> Vec<SignedMessage> {
		self.historical_votes
			.iter()
			.filter(|msg| &msg.id == id)
			.cloned()
			.collect()
	}
}

impl From<Prevote> for Message {
	fn from(prevote: Prevote) -> Self {
		Message::Prevote(prevote)
	}
}

impl From<Precommit> for Message {
	fn from(precommit: Precommit) -> Self {
		Message::Precommit(precommit)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{forked_tree, hash, TestSigner};

	fn voters() -> VoterSet {
		VoterSet::new(
			["Alice", "Bob", "Carol", "Dave"]
				.iter()
				.map(|id| (id.to_string(), 1)),
		)
		.unwrap()
	}

	fn signer() -> TestSigner {
		TestSigner::new(["Alice", "Bob", "Carol", "Dave", "Mallory"])
	}

	fn round() -> Round {
		Round::new(RoundParams {
			round_number: 1,
			set_id: 0,
			voters: voters(),
			base: (hash("0"), 0),
			started_at: 0,
		})
	}

	fn signed(
		signer: &TestSigner,
		id: &str,
		message: Message,
		round_number: RoundNumber,
		set_id: SetId,
	) -> SignedMessage {
		let payload = localized_payload(round_number, set_id, &message);
		let signature = signer.sign(&payload, &id.to_string()).unwrap();
		SignedMessage {
			message,
			round_number,
			set_id,
			id: id.to_string(),
			signature,
		}
	}

	fn prevote(signer: &TestSigner, id: &str, block: &str, number: u64) -> SignedMessage {
		signed(
			signer,
			id,
			Message::Prevote(Prevote::new(hash(block), number)),
			1,
			0,
		)
	}

	fn precommit(signer: &TestSigner, id: &str, block: &str, number: u64) -> SignedMessage {
		signed(
			signer,
			id,
			Message::Precommit(Precommit::new(hash(block), number)),
			1,
			0,
		)
	}

	#[test]
	fn rejects_unauthenticated_messages() {
		let tree = forked_tree();
		let signer = signer();
		let mut round = round();

		// Signature by a voter over someone else's identity.
		let mut msg = prevote(&signer, "Alice", "2", 2);
		msg.id = "Bob".to_string();
		assert_eq!(
			round.import(&tree, &signer, msg),
			Err(Error::BadSignature("Bob".to_string())),
		);

		// Valid signature but not an authority.
		let msg = prevote(&signer, "Mallory", "2", 2);
		assert_eq!(
			round.import(&tree, &signer, msg),
			Err(Error::UnknownVoter("Mallory".to_string())),
		);

		// Wrong round.
		let msg = signed(
			&signer,
			"Alice",
			Message::Prevote(Prevote::new(hash("2"), 2)),
			7,
			0,
		);
		assert_eq!(
			round.import(&tree, &signer, msg),
			Err(Error::WrongRound {
				got: 7,
				expected: 1,
			}),
		);
	}

	#[test]
	fn replayed_signature_from_other_round_is_rejected() {
		let tree = forked_tree();
		let signer = signer();
		let mut round = round();

		let mut msg = prevote(&signer, "Alice", "2", 2);
		let other_round_payload = localized_payload(
			2,
			0,
			&Message::Prevote(Prevote::new(hash("2"), 2)),
		);
		msg.signature = signer.sign(&other_round_payload, &"Alice".to_string()).unwrap();
		assert_eq!(
			round.import(&tree, &signer, msg),
			Err(Error::BadSignature("Alice".to_string())),
		);
	}

	#[test]
	fn prevote_ghost_needs_supermajority() {
		let tree = forked_tree();
		let signer = signer();
		let mut round = round();

		round
			.import(&tree, &signer, prevote(&signer, "Alice", "4", 4))
			.unwrap();
		round
			.import(&tree, &signer, prevote(&signer, "Bob", "4", 4))
			.unwrap();
		assert_eq!(round.prevote_ghost(), None);

		round
			.import(&tree, &signer, prevote(&signer, "Carol", "4", 4))
			.unwrap();
		assert_eq!(round.prevote_ghost(), Some((hash("4"), 4)));
		assert_eq!(round.stage(), Stage::Precommitting);
	}

	#[test]
	fn round_completes_and_finalizes() {
		let tree = forked_tree();
		let signer = signer();
		let mut round = round();

		for id in &["Alice", "Bob", "Carol"] {
			round
				.import(&tree, &signer, prevote(&signer, id, "4", 4))
				.unwrap();
		}
		for id in &["Alice", "Bob", "Carol"] {
			round
				.import(&tree, &signer, precommit(&signer, id, "4", 4))
				.unwrap();
		}

		assert_eq!(round.finalized(), Some((hash("4"), 4)));
		assert!(round.completable());
		assert_eq!(round.stage(), Stage::Completable);

		// The round stays open: a late precommit still imports fine.
		round
			.import(&tree, &signer, precommit(&signer, "Dave", "4", 4))
			.unwrap();
		assert_eq!(round.finalized(), Some((hash("4"), 4)));
	}

	#[test]
	fn precommit_equivocator_counts_for_no_block() {
		let tree = forked_tree();
		let signer = signer();
		let mut round = round();

		for id in &["Alice", "Bob", "Carol", "Dave"] {
			round
				.import(&tree, &signer, prevote(&signer, id, "4", 4))
				.unwrap();
		}

		round
			.import(&tree, &signer, precommit(&signer, "Alice", "4", 4))
			.unwrap();
		round
			.import(&tree, &signer, precommit(&signer, "Bob", "4", 4))
			.unwrap();
		let outcome = round
			.import(&tree, &signer, precommit(&signer, "Bob", "8", 5))
			.unwrap();
		match outcome {
			ImportOutcome::Equivocation(evidence) => {
				assert_eq!(evidence.id, "Bob");
				assert_eq!(evidence.phase, Phase::Precommit);
			}
			other => panic!("expected equivocation, got {:?}", other),
		}

		// Bob's weight now counts for neither target: only Alice backs
		// block 4, so nothing is finalized.
		assert_eq!(round.finalized(), None);

		round
			.import(&tree, &signer, precommit(&signer, "Carol", "4", 4))
			.unwrap();
		round
			.import(&tree, &signer, precommit(&signer, "Dave", "4", 4))
			.unwrap();
		assert_eq!(round.finalized(), Some((hash("4"), 4)));
	}

	#[test]
	fn estimate_drops_below_ghost_before_precommit_threshold() {
		let tree = forked_tree();
		let signer = signer();
		let mut round = round();

		for id in &["Alice", "Bob", "Carol"] {
			round
				.import(&tree, &signer, prevote(&signer, id, "4", 4))
				.unwrap();
		}
		assert_eq!(round.prevote_ghost(), Some((hash("4"), 4)));

		// Alice equivocates and Carol precommits the other fork. Only two
		// voters have been heard from, but with two weight units void or
		// committed elsewhere, no block above 1 can reach the threshold.
		round
			.import(&tree, &signer, precommit(&signer, "Alice", "4", 4))
			.unwrap();
		round
			.import(&tree, &signer, precommit(&signer, "Alice", "8", 5))
			.unwrap();
		round
			.import(&tree, &signer, precommit(&signer, "Carol", "8", 5))
			.unwrap();

		assert_eq!(round.estimate(), Some((hash("1"), 1)));
		assert!(!round.completable());
	}

	#[test]
	fn local_voter_prevotes_and_precommits() {
		let tree = forked_tree();
		let signer = signer();
		let timeouts = Timeouts::default();
		let mut round = round();
		let alice = "Alice".to_string();

		// Round 1 primary is Bob; Alice waits out the proposal window.
		let out = round
			.poll_local(&tree, &signer, &alice, (hash("0"), 0), &timeouts, 0)
			.unwrap();
		assert!(out.is_empty());

		let out = round
			.poll_local(&tree, &signer, &alice, (hash("0"), 0), &timeouts, 3)
			.unwrap();
		assert_eq!(out.len(), 1);
		match &out[0].message {
			Message::Prevote(prevote) => assert_eq!(prevote.target_hash, hash("8")),
			other => panic!("expected prevote, got {:?}", other),
		}
		for msg in out {
			round.import(&tree, &signer, msg).unwrap();
		}

		// No prevote-GHOST yet, so no precommit before the timeout.
		let out = round
			.poll_local(&tree, &signer, &alice, (hash("0"), 0), &timeouts, 4)
			.unwrap();
		assert!(out.is_empty());

		for id in &["Bob", "Carol"] {
			round
				.import(&tree, &signer, prevote(&signer, id, "8", 5))
				.unwrap();
		}
		let out = round
			.poll_local(&tree, &signer, &alice, (hash("0"), 0), &timeouts, 5)
			.unwrap();
		assert_eq!(out.len(), 1);
		match &out[0].message {
			Message::Precommit(precommit) => assert_eq!(precommit.target_hash, hash("8")),
			other => panic!("expected precommit, got {:?}", other),
		}
	}

	#[test]
	fn primary_broadcasts_proposal_first() {
		let tree = forked_tree();
		let signer = signer();
		let timeouts = Timeouts::default();
		let mut round = round();
		let bob = "Bob".to_string();

		let out = round
			.poll_local(&tree, &signer, &bob, (hash("0"), 0), &timeouts, 0)
			.unwrap();
		assert!(matches!(out[0].message, Message::PrimaryPropose(_)));
		assert!(matches!(out[1].message, Message::Prevote(_)));
	}

	#[test]
	fn timeout_falls_back_to_previous_estimate() {
		let tree = forked_tree();
		let signer = signer();
		let timeouts = Timeouts::default();
		let mut round = round();
		let alice = "Alice".to_string();

		let out = round
			.poll_local(&tree, &signer, &alice, (hash("0"), 0), &timeouts, 3)
			.unwrap();
		for msg in out {
			round.import(&tree, &signer, msg).unwrap();
		}

		// Nobody else prevotes; past the precommit timeout the voter falls
		// back to the previous round estimate instead of stalling.
		let out = round
			.poll_local(
				&tree,
				&signer,
				&alice,
				(hash("0"), 0),
				&timeouts,
				timeouts.precommit_timeout,
			)
			.unwrap();
		assert_eq!(out.len(), 1);
		match &out[0].message {
			Message::Precommit(precommit) => assert_eq!(precommit.target_hash, hash("0")),
			other => panic!("expected precommit, got {:?}", other),
		}
	}
}
