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

pub type BlockNumber = u64;

/// Opaque block identifier. The gadget never inspects block contents, it
/// only compares hashes and asks the chain oracle about ancestry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct BlockHash(pub [u8; 32]);

impl Display for BlockHash {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(
			f,
			"{:02x}{:02x}{:02x}{:02x}",
			self.0[0], self.0[1], self.0[2], self.0[3]
		)
	}
}

impl std::fmt::Debug for BlockHash {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "BlockHash({})", self)
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
	pub hash: BlockHash,
	pub number: BlockNumber,
	pub parent: BlockHash,
}

impl Block {
	pub fn new(hash: BlockHash, number: BlockNumber, parent: BlockHash) -> Self {
		Self {
			hash,
			number,
			parent,
		}
	}

	pub fn is_genesis(&self) -> bool {
		self.number == 0 && self.parent == self.hash
	}
}

impl Display for Block {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "Block({}, number: {})", self.hash, self.number)
	}
}
