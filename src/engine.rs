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

use log::{debug, info, warn};
use parity_scale_codec::{Decode, Encode};
use std::collections::BTreeMap;

use crate::authorities::{AuthoritySet, SharedAuthoritySet};
use crate::block::{BlockHash, BlockNumber};
use crate::chain::Chain;
use crate::crypto::SignatureOracle;
use crate::error::Error;
use crate::justification::Justification;
use crate::round::{
	EquivocationEvidence, ImportOutcome, Round, RoundParams, RoundState, Stage, Tick, Timeouts,
};
use crate::voting::{
	RoundNumber, SetId, SignedMessage, SignedPrecommit, SignedPrevote, VoterId,
};

/// How many ticks to wait before re-requesting a catch-up.
const CATCH_UP_RETRY: Tick = 20;

/// How often a voter repeats its own votes while the round is stuck.
const REBROADCAST_INTERVAL: Tick = 32;

/// Engine-level state. `CatchingUp` is entered whenever the network is
/// observed to be more than one round ahead of us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	CatchingUp(RoundNumber),
	Voting,
}

/// Side effects the embedding node must carry out, drained via [`FinalityEngine::poll`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineAction {
	/// Gossip a vote message to all peers.
	Broadcast(SignedMessage),
	/// A block became final. Emitted exactly once per finalized block, in
	/// increasing block number order.
	Finalized {
		hash: BlockHash,
		number: BlockNumber,
		justification: Justification,
	},
	/// Ask peers for the message set of the given completed round.
	RequestCatchUp(RoundNumber),
	/// Evidence for a slashing pipeline.
	EquivocationDetected(EquivocationEvidence),
	/// Operator-facing condition: safety violation or catch-up failure.
	Alert(Error),
}

/// Diagnostic snapshot of the round currently driven by this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundStatus {
	pub round_number: RoundNumber,
	pub set_id: SetId,
	pub stage: Stage,
	pub prevote_weight: u64,
	pub precommit_weight: u64,
	pub total_weight: u64,
	pub state: RoundState,
}

/// The full message set of a completed round, letting a lagging voter
/// fast-forward without replaying every round in between.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct CatchUp {
	pub round_number: RoundNumber,
	pub set_id: SetId,
	pub base_hash: BlockHash,
	pub base_number: BlockNumber,
	pub prevotes: Vec<SignedPrevote>,
	pub precommits: Vec<SignedPrecommit>,
}

/// The minimum state a node persists: enough to restart voting and to prove
/// its finalized head to a new peer.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PersistedState {
	pub last_finalized_hash: BlockHash,
	pub last_finalized_number: BlockNumber,
	pub round_number: RoundNumber,
	pub authorities: AuthoritySet,
	pub justification: Option<Justification>,
}

/// Orchestrates sequential voting rounds for one node.
///
/// The engine is a single-writer state machine: the embedding event loop
/// feeds it incoming messages and clock ticks, and drains the resulting
/// actions. Rounds overlap (round `r+1` accepts votes while `r` concludes)
/// but all mutation happens through these two entry points.
pub struct FinalityEngine<C, S> {
	chain: C,
	oracle: S,
	authorities: SharedAuthoritySet,
	local_id: Option<VoterId>,
	timeouts: Timeouts,

	state: EngineState,
	rounds: BTreeMap<RoundNumber, Round>,
	current_round: RoundNumber,
	// The newest round known completed without kept state, and its estimate.
	// Round 0 of every set id is completed by definition at the set's base.
	completed_base: (RoundNumber, (BlockHash, BlockNumber)),
	last_finalized: (BlockHash, BlockNumber),
	last_justification: Option<Justification>,

	now: Tick,
	last_rebroadcast: Tick,
	catch_up_requested_at: Option<Tick>,
	alerted_round: Option<RoundNumber>,
	actions: Vec<EngineAction>,
}

impl<C: Chain, S: SignatureOracle> FinalityEngine<C, S> {
	pub fn new(
		chain: C,
		oracle: S,
		authorities: SharedAuthoritySet,
		local_id: Option<VoterId>,
		base: (BlockHash, BlockNumber),
		timeouts: Timeouts,
	) -> Self {
		let mut engine = Self {
			chain,
			oracle,
			authorities,
			local_id,
			timeouts,
			state: EngineState::Idle,
			rounds: BTreeMap::new(),
			current_round: 1,
			completed_base: (0, base),
			last_finalized: base,
			last_justification: None,
			now: 0,
			last_rebroadcast: 0,
			catch_up_requested_at: None,
			alerted_round: None,
			actions: Vec::new(),
		};
		engine.ensure_round(1);
		engine
	}

	/// Rebuild an engine from a persisted snapshot. Voting resumes at the
	/// stored round with the stored finalized block as base.
	pub fn restore(
		chain: C,
		oracle: S,
		persisted: PersistedState,
		local_id: Option<VoterId>,
		timeouts: Timeouts,
	) -> Self {
		let base = (
			persisted.last_finalized_hash,
			persisted.last_finalized_number,
		);
		let authorities = std::sync::Arc::new(parking_lot::RwLock::new(persisted.authorities));
		let mut engine = Self {
			chain,
			oracle,
			authorities,
			local_id,
			timeouts,
			state: EngineState::Idle,
			rounds: BTreeMap::new(),
			current_round: persisted.round_number,
			completed_base: (persisted.round_number.saturating_sub(1), base),
			last_finalized: base,
			last_justification: persisted.justification,
			now: 0,
			last_rebroadcast: 0,
			catch_up_requested_at: None,
			alerted_round: None,
			actions: Vec::new(),
		};
		engine.ensure_round(engine.current_round);
		engine
	}

	pub fn persisted_state(&self) -> PersistedState {
		PersistedState {
			last_finalized_hash: self.last_finalized.0,
			last_finalized_number: self.last_finalized.1,
			round_number: self.current_round,
			authorities: self.authorities.read().clone(),
			justification: self.last_justification.clone(),
		}
	}

	pub fn state(&self) -> EngineState {
		self.state
	}

	pub fn last_finalized(&self) -> (BlockHash, BlockNumber) {
		self.last_finalized
	}

	pub fn authorities(&self) -> &SharedAuthoritySet {
		&self.authorities
	}

	pub fn current_round_number(&self) -> RoundNumber {
		self.current_round
	}

	/// Diagnostic view of the round this node is currently voting in.
	pub fn current_round_state(&self) -> RoundStatus {
		let round = &self.rounds[&self.current_round];
		let (prevote_weight, total_weight) = round.prevote_participation();
		let (precommit_weight, _) = round.precommit_participation();
		RoundStatus {
			round_number: round.number(),
			set_id: round.set_id(),
			stage: round.stage(),
			prevote_weight,
			precommit_weight,
			total_weight,
			state: round.state(),
		}
	}

	/// Network-facing ingress for vote messages.
	///
	/// Authentication and protocol errors are returned and the message is
	/// dropped; they never halt the engine. A message from far ahead of the
	/// local round flips the engine into catch-up.
	pub fn import_message(&mut self, msg: SignedMessage) -> Result<ImportOutcome, Error> {
		let current_set_id = self.authorities.read().set_id();
		if msg.set_id != current_set_id {
			return Err(Error::WrongSetId {
				got: msg.set_id,
				expected: current_set_id,
			});
		}

		if msg.round_number > self.current_round + 1 {
			// We are lagging by more than the natural one-round overlap.
			let target = msg.round_number - 1;
			debug!(
				target: "finality",
				"observed round {} while at round {}, catching up",
				msg.round_number, self.current_round,
			);
			self.state = EngineState::CatchingUp(target);
			self.request_catch_up(target);
			return Err(Error::WrongRound {
				got: msg.round_number,
				expected: self.current_round,
			});
		}

		let floor = self.rounds.keys().next().copied().unwrap_or(self.current_round);
		if msg.round_number < floor {
			return Err(Error::WrongRound {
				got: msg.round_number,
				expected: self.current_round,
			});
		}

		self.ensure_round(msg.round_number);
		let round = self
			.rounds
			.get_mut(&msg.round_number)
			.expect("round ensured above");
		let outcome = round.import(&self.chain, &self.oracle, msg)?;
		if let ImportOutcome::Equivocation(evidence) = &outcome {
			self.actions
				.push(EngineAction::EquivocationDetected(evidence.clone()));
		}

		self.progress();
		Ok(outcome)
	}

	/// Advance timers, drive the local voter and drain pending actions.
	pub fn poll(&mut self, now: Tick) -> Vec<EngineAction> {
		self.now = now;

		if self.state == EngineState::Idle {
			self.state = EngineState::Voting;
		}

		self.check_forced_change();

		if let EngineState::CatchingUp(target) = self.state {
			let due = self
				.catch_up_requested_at
				.map_or(true, |at| now >= at + CATCH_UP_RETRY);
			if due {
				self.request_catch_up(target);
			}
			return std::mem::take(&mut self.actions);
		}

		if let Some(local_id) = self.local_id.clone() {
			let previous_estimate = self.previous_estimate(self.current_round);
			// Importing our own prevote can immediately unlock our precommit,
			// so poll until the voter has nothing further to say.
			loop {
				let round = self
					.rounds
					.get_mut(&self.current_round)
					.expect("current round always exists");
				let messages = match round.poll_local(
					&self.chain,
					&self.oracle,
					&local_id,
					previous_estimate,
					&self.timeouts,
					now,
				) {
					Ok(messages) => messages,
					Err(e) => {
						warn!(target: "finality", "local voter error: {}", e);
						break;
					}
				};
				if messages.is_empty() {
					break;
				}
				for msg in messages {
					self.actions.push(EngineAction::Broadcast(msg.clone()));
					// Our own votes count like anyone else's.
					if let Err(e) = self
						.rounds
						.get_mut(&self.current_round)
						.expect("current round always exists")
						.import(&self.chain, &self.oracle, msg)
					{
						warn!(target: "finality", "failed to import own vote: {}", e);
					}
				}
			}

			// A stuck round gets our votes repeated, in case the first
			// broadcast was lost.
			let round = &self.rounds[&self.current_round];
			if !round.completable() && now >= self.last_rebroadcast + REBROADCAST_INTERVAL {
				self.last_rebroadcast = now;
				for msg in round.own_votes(&local_id) {
					self.actions.push(EngineAction::Broadcast(msg));
				}
			}
		}

		let current = &self.rounds[&self.current_round];
		if current.safety_violated() && self.alerted_round != Some(self.current_round) {
			self.alerted_round = Some(self.current_round);
			self.actions.push(EngineAction::Alert(Error::SafetyViolation(
				self.current_round,
			)));
		}

		self.progress();
		std::mem::take(&mut self.actions)
	}

	/// The message set of a completed round, served to lagging peers.
	pub fn catch_up_for(&self, round_number: RoundNumber) -> Option<CatchUp> {
		let round = self.rounds.get(&round_number)?;
		if !round.completable() {
			return None;
		}
		let (base_hash, base_number) = round.base();
		Some(CatchUp {
			round_number,
			set_id: round.set_id(),
			base_hash,
			base_number,
			prevotes: round.prevotes(),
			precommits: round.precommits(),
		})
	}

	/// Validate a catch-up and fast-forward to the round after it. On
	/// failure the engine stays in catch-up and retries with backoff.
	pub fn import_catch_up(&mut self, catch_up: CatchUp) -> Result<(), Error> {
		let (voters, set_id) = {
			let authorities = self.authorities.read();
			(authorities.current().clone(), authorities.set_id())
		};
		if catch_up.set_id != set_id {
			return Err(Error::WrongSetId {
				got: catch_up.set_id,
				expected: set_id,
			});
		}
		if catch_up.round_number < self.current_round {
			// Nothing to gain, not an error.
			return Ok(());
		}

		let round_number = catch_up.round_number;
		if self.chain.block_number(catch_up.base_hash).is_none() {
			warn!(
				target: "finality",
				"catch-up for round {} references unknown base {}",
				round_number, catch_up.base_hash,
			);
			return Err(Error::CatchUpFailure(round_number));
		}

		let mut round = Round::new(RoundParams {
			round_number,
			set_id,
			voters,
			base: (catch_up.base_hash, catch_up.base_number),
			started_at: self.now,
		});
		for prevote in catch_up.prevotes {
			let msg = SignedMessage {
				message: crate::voting::Message::Prevote(prevote.prevote),
				round_number,
				set_id,
				id: prevote.id,
				signature: prevote.signature,
			};
			round
				.import(&self.chain, &self.oracle, msg)
				.map_err(|_| Error::CatchUpFailure(round_number))?;
		}
		for precommit in catch_up.precommits {
			let msg = SignedMessage {
				message: crate::voting::Message::Precommit(precommit.precommit),
				round_number,
				set_id,
				id: precommit.id,
				signature: precommit.signature,
			};
			round
				.import(&self.chain, &self.oracle, msg)
				.map_err(|_| Error::CatchUpFailure(round_number))?;
		}

		if !round.completable() || round.finalized().is_none() {
			return Err(Error::CatchUpFailure(round_number));
		}

		info!(
			target: "finality",
			"caught up from round {} to round {}",
			self.current_round,
			round_number + 1,
		);
		self.rounds.clear();
		self.rounds.insert(round_number, round);
		self.current_round = round_number + 1;
		self.ensure_round(self.current_round);
		self.state = EngineState::Voting;
		self.catch_up_requested_at = None;
		self.progress();
		Ok(())
	}

	fn request_catch_up(&mut self, target: RoundNumber) {
		self.catch_up_requested_at = Some(self.now);
		self.actions.push(EngineAction::RequestCatchUp(target));
	}

	fn ensure_round(&mut self, round_number: RoundNumber) {
		if self.rounds.contains_key(&round_number) {
			return;
		}
		let (voters, set_id) = {
			let authorities = self.authorities.read();
			(authorities.current().clone(), authorities.set_id())
		};
		let round = Round::new(RoundParams {
			round_number,
			set_id,
			voters,
			base: self.last_finalized,
			started_at: self.now,
		});
		debug!(
			target: "finality",
			"starting round {} (set {}) on base {}",
			round_number, set_id, self.last_finalized.0,
		);
		self.rounds.insert(round_number, round);
	}

	// Estimate of the round before `round_number`, constraining what the
	// local voter may vote for.
	fn previous_estimate(&self, round_number: RoundNumber) -> (BlockHash, BlockNumber) {
		if round_number == self.completed_base.0 + 1 {
			return self.completed_base.1;
		}
		self.rounds
			.get(&(round_number - 1))
			.and_then(|round| round.estimate())
			.unwrap_or(self.last_finalized)
	}

	// Advance the current round past completed ones, open the speculative
	// next round, emit finality notifications and prune retired rounds.
	fn progress(&mut self) {
		while self
			.rounds
			.get(&self.current_round)
			.map_or(false, |round| round.completable())
		{
			self.current_round += 1;
			self.ensure_round(self.current_round);
		}

		// Round r+1 opens for remote votes as soon as round r has a
		// prevote-GHOST, before r is completable.
		if self.rounds[&self.current_round].prevote_ghost().is_some() {
			self.ensure_round(self.current_round + 1);
		}

		self.emit_finalized();
		self.prune_rounds();
	}

	fn emit_finalized(&mut self) {
		// Only rounds at or below the current one may commit results;
		// results of the speculative round wait until it is reached.
		let mut newly_finalized: Vec<RoundNumber> = self
			.rounds
			.iter()
			.filter(|(number, round)| {
				**number <= self.current_round
					&& round
						.finalized()
						.map_or(false, |(_, n)| n > self.last_finalized.1)
			})
			.map(|(number, _)| *number)
			.collect();
		newly_finalized.sort_unstable();

		for round_number in newly_finalized {
			let round = &self.rounds[&round_number];
			let (hash, number) = match round.finalized() {
				Some(finalized) if finalized.1 > self.last_finalized.1 => finalized,
				_ => continue,
			};
			let justification = match Justification::build(round, &self.chain) {
				Ok(justification) => justification,
				Err(e) => {
					warn!(
						target: "finality",
						"round {} finalized {} but justification failed: {}",
						round_number, hash, e,
					);
					continue;
				}
			};

			info!(
				target: "finality",
				"finalized block {} (number {}) in round {}",
				hash, number, round_number,
			);
			self.last_finalized = (hash, number);
			self.last_justification = Some(justification.clone());
			self.actions.push(EngineAction::Finalized {
				hash,
				number,
				justification,
			});

			let rotated = self.authorities.write().apply_standard_change(number);
			if let Some(new_set_id) = rotated {
				self.start_new_set(new_set_id);
				return;
			}
		}
	}

	fn check_forced_change(&mut self) {
		let best_number = self
			.chain
			.best_chain_containing(self.last_finalized.0)
			.map(|(_, number)| number);
		if let Some(best_number) = best_number {
			let rotated = self.authorities.write().apply_forced_change(best_number);
			if let Some(new_set_id) = rotated {
				self.start_new_set(new_set_id);
			}
		}
	}

	// Abandon all in-flight rounds of the old set and restart voting at
	// round 1 of the new set, with round 0 completed by definition at the
	// last finalized block.
	fn start_new_set(&mut self, new_set_id: SetId) {
		info!(
			target: "finality",
			"restarting voter for new authority set {} on base {}",
			new_set_id, self.last_finalized.0,
		);
		self.rounds.clear();
		self.current_round = 1;
		self.completed_base = (0, self.last_finalized);
		self.alerted_round = None;
		self.catch_up_requested_at = None;
		self.state = EngineState::Voting;
		self.ensure_round(1);
	}

	fn prune_rounds(&mut self) {
		// A round is retired once two later rounds have completed; keeping
		// the immediate predecessor preserves the estimate chain.
		let floor = self.current_round.saturating_sub(1);
		let retired: Vec<RoundNumber> = self
			.rounds
			.keys()
			.copied()
			.filter(|number| *number < floor)
			.collect();
		for number in retired {
			if let Some(mut round) = self.rounds.remove(&number) {
				round.conclude();
				debug!(target: "finality", "concluded round {}", number);
			}
		}
	}
}
