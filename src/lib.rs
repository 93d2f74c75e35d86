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

//! Round-Based Block Finality
//! ==========================
//!
//! A finality gadget in the GRANDPA family: a committee of weighted voters
//! runs a sequence of two-phase voting rounds over an externally grown block
//! tree, and agrees on an ever-advancing finalized prefix of it. Finalizing a
//! block finalizes all of its ancestors; reverting a finalized block requires
//! at least a third of the voters to provably misbehave.
//!
//! The gadget is deliberately passive about everything but voting. Block
//! production, networking, cryptography and wall clocks live with the
//! embedding node, behind the [`chain::Chain`] and [`crypto::SignatureOracle`]
//! traits and a logical tick clock. The [`engine::FinalityEngine`] is driven
//! by feeding it incoming messages and ticks, and draining the actions it
//! wants performed.
//!
//! Definitions
//! ===========
//!
//! Supermajority
//! -------------
//! A set of votes has a supermajority for a block B when the voters backing B
//! or descendants of B carry strictly more than 2/3 of the total weight. With
//! total weight t this is the threshold t - (t - 1) / 3, in exact integer
//! arithmetic. A voter who casts two different votes in the same phase of the
//! same round (an equivocation) counts towards no block at all.
//!
//! GHOST Function
//! --------------
//! The function g(S) takes a set of votes and returns the block with the
//! highest block number such that S has a supermajority for it. Since two
//! incomparable blocks cannot both have a supermajority, g(S) is unique when
//! it exists, and every round's outcomes lie on the chain from the round base
//! to g(prevotes).
//!
//! Estimate
//! --------
//! The estimate of round r is the highest block in the chain with head
//! g(prevotes of r) for which it is still possible for the precommits of r to
//! have a supermajority, counting the weight not yet heard from.
//!
//! Completable
//! -----------
//! Round r is completable when the estimate exists and either lies strictly
//! below g(prevotes of r), or no strict descendant of g(prevotes of r) can
//! reach a precommit supermajority any more. A completable round has revealed
//! everything it could possibly finalize, so the next round can safely begin.
//!
//! Round Flow
//! ==========
//!
//! Each round the designated primary voter broadcasts the previous round's
//! estimate as a proposal hint, voters prevote for the head of their best
//! chain extending it, and once a prevote-GHOST emerges they precommit to it.
//! A precommit supermajority at or below the prevote-GHOST finalizes that
//! block, and the [`justification::Justification`] packaging those precommits
//! is what convinces everyone else. Authority membership rotates through
//! scheduled set changes, each new set starting again from round 1 with a
//! fresh set id.

pub mod authorities;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod justification;
pub mod round;
pub mod testing;
pub mod tracker;
pub mod voting;


pub use authorities::{AuthoritySet, PendingChange, SharedAuthoritySet};
pub use block::{Block, BlockHash, BlockNumber};
pub use chain::Chain;
pub use crypto::SignatureOracle;
pub use engine::{CatchUp, EngineAction, EngineState, FinalityEngine, PersistedState, RoundStatus};
pub use error::Error;
pub use justification::Justification;
pub use round::{Round, RoundParams, RoundState, Stage, Tick, Timeouts};
pub use voting::{
	Message, Precommit, Prevote, RoundNumber, SetId, Signature, SignedMessage, VoterId, VoterSet,
	VoterWeight,
};
