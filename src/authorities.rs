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

use log::info;
use parity_scale_codec::{Decode, Encode};
use std::sync::Arc;

use crate::block::BlockNumber;
use crate::error::Error;
use crate::voting::{SetId, VoterSet};

/// The authority set is read-shared by all live rounds and mutated only by
/// the voter set manager at finalization boundaries.
pub type SharedAuthoritySet = Arc<parking_lot::RwLock<AuthoritySet>>;

/// An authority set change scheduled by the chain.
///
/// A standard change takes effect once the block `delay` blocks past
/// `scheduled_at` is *finalized*. A forced change takes effect as soon as
/// the chain reaches the effective height, finalized or not.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PendingChange {
	pub next_voters: VoterSet,
	pub scheduled_at: BlockNumber,
	pub delay: BlockNumber,
}

impl PendingChange {
	pub fn effective_number(&self) -> BlockNumber {
		self.scheduled_at + self.delay
	}
}

/// The current weighted authority membership together with its monotonically
/// increasing set id, plus up to one pending standard and one pending forced
/// change.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AuthoritySet {
	current: VoterSet,
	set_id: SetId,
	pending_standard: Option<PendingChange>,
	pending_forced: Option<PendingChange>,
}

impl AuthoritySet {
	pub fn new(current: VoterSet, set_id: SetId) -> Self {
		Self {
			current,
			set_id,
			pending_standard: None,
			pending_forced: None,
		}
	}

	pub fn current(&self) -> &VoterSet {
		&self.current
	}

	pub fn set_id(&self) -> SetId {
		self.set_id
	}

	pub fn pending_standard(&self) -> Option<&PendingChange> {
		self.pending_standard.as_ref()
	}

	pub fn pending_forced(&self) -> Option<&PendingChange> {
		self.pending_forced.as_ref()
	}

	/// Schedule a standard change. At most one may be pending at a time.
	pub fn schedule_change(&mut self, change: PendingChange) -> Result<(), Error> {
		if self.pending_standard.is_some() {
			return Err(Error::PendingChange);
		}
		info!(
			target: "finality",
			"scheduling standard authority set change, effective once block {} is finalized",
			change.effective_number(),
		);
		self.pending_standard = Some(change);
		Ok(())
	}

	/// Schedule a forced change. May coexist with a pending standard change
	/// but not with another forced one.
	pub fn schedule_forced_change(&mut self, change: PendingChange) -> Result<(), Error> {
		if self.pending_forced.is_some() {
			return Err(Error::PendingChange);
		}
		info!(
			target: "finality",
			"scheduling forced authority set change at block {}",
			change.effective_number(),
		);
		self.pending_forced = Some(change);
		Ok(())
	}

	/// Enact a pending standard change if `finalized_number` has reached its
	/// effective height. Returns the new set id on rotation.
	pub fn apply_standard_change(&mut self, finalized_number: BlockNumber) -> Option<SetId> {
		let enacts = self
			.pending_standard
			.as_ref()
			.map_or(false, |change| finalized_number >= change.effective_number());
		if !enacts {
			return None;
		}
		let change = self.pending_standard.take().expect("checked above");
		Some(self.rotate(change.next_voters))
	}

	/// Enact a pending forced change if the chain has reached its effective
	/// height, regardless of finality.
	pub fn apply_forced_change(&mut self, best_number: BlockNumber) -> Option<SetId> {
		let enacts = self
			.pending_forced
			.as_ref()
			.map_or(false, |change| best_number >= change.effective_number());
		if !enacts {
			return None;
		}
		let change = self.pending_forced.take().expect("checked above");
		Some(self.rotate(change.next_voters))
	}

	fn rotate(&mut self, next: VoterSet) -> SetId {
		self.current = next;
		self.set_id += 1;
		// Any change scheduled under the old set dies with it.
		self.pending_standard = None;
		self.pending_forced = None;
		info!(
			target: "finality",
			"authority set rotated, new set id {} with {} voters",
			self.set_id,
			self.current.len(),
		);
		self.set_id
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn set(ids: &[&str]) -> VoterSet {
		VoterSet::new(ids.iter().map(|id| (id.to_string(), 1))).unwrap()
	}

	#[test]
	fn standard_change_waits_for_finality() {
		let mut authorities = AuthoritySet::new(set(&["Alice", "Bob"]), 0);
		authorities
			.schedule_change(PendingChange {
				next_voters: set(&["Carol", "Dave"]),
				scheduled_at: 90,
				delay: 10,
			})
			.unwrap();

		assert_eq!(authorities.apply_standard_change(99), None);
		assert_eq!(authorities.apply_standard_change(100), Some(1));
		assert_eq!(authorities.set_id(), 1);
		assert!(authorities.current().contains(&"Carol".to_string()));
		assert!(!authorities.current().contains(&"Alice".to_string()));
	}

	#[test]
	fn only_one_standard_change_pending() {
		let mut authorities = AuthoritySet::new(set(&["Alice", "Bob"]), 0);
		let change = PendingChange {
			next_voters: set(&["Carol"]),
			scheduled_at: 10,
			delay: 0,
		};
		authorities.schedule_change(change.clone()).unwrap();
		assert_eq!(authorities.schedule_change(change), Err(Error::PendingChange));
	}

	#[test]
	fn forced_change_ignores_finality() {
		// Forced change at block 100 with finality stuck at block 80.
		let mut authorities = AuthoritySet::new(set(&["Alice", "Bob"]), 3);
		authorities
			.schedule_forced_change(PendingChange {
				next_voters: set(&["Carol", "Dave"]),
				scheduled_at: 100,
				delay: 0,
			})
			.unwrap();

		assert_eq!(authorities.apply_standard_change(80), None);
		assert_eq!(authorities.apply_forced_change(99), None);
		assert_eq!(authorities.apply_forced_change(100), Some(4));
		assert_eq!(authorities.set_id(), 4);
	}

	#[test]
	fn rotation_clears_both_pending_changes() {
		let mut authorities = AuthoritySet::new(set(&["Alice", "Bob"]), 0);
		authorities
			.schedule_change(PendingChange {
				next_voters: set(&["Carol"]),
				scheduled_at: 50,
				delay: 0,
			})
			.unwrap();
		authorities
			.schedule_forced_change(PendingChange {
				next_voters: set(&["Dave"]),
				scheduled_at: 40,
				delay: 0,
			})
			.unwrap();

		assert_eq!(authorities.apply_forced_change(45), Some(1));
		assert!(authorities.pending_standard().is_none());
		assert!(authorities.pending_forced().is_none());
	}
}
