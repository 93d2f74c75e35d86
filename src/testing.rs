//! Deterministic in-memory stand-ins for the external collaborators: a
//! label-addressed block tree and a keyring-style signature oracle. Real
//! nodes wire in their own chain and keystore instead.

use crate::block::{Block, BlockHash};
use crate::chain::{BlockTree, Chain};
use crate::crypto::SignatureOracle;
use crate::error::Error;
use crate::voting::{Signature, VoterId};

/// Derive a block hash from a short label, so test chains read like the
/// diagrams they come from.
pub fn hash(label: &str) -> BlockHash {
	let mut bytes = [0u8; 32];
	let label = label.as_bytes();
	for (i, byte) in bytes.iter_mut().enumerate() {
		*byte = label[i % label.len()].wrapping_mul(i as u8 + 31) ^ (label.len() as u8);
	}
	BlockHash(bytes)
}

/// An arbitrary, distinct signature for tests that drive the tracker
/// directly, below the level where the oracle is consulted.
pub fn signature(id: &str, nonce: u8) -> Signature {
	let mut bytes = id.as_bytes().to_vec();
	bytes.push(nonce);
	Signature(bytes)
}

/// The two-fork tree used throughout the tests:
///
/// 0 -> 1 -> 2 -> 3 -> 4
///       \-> 5 -> 6 -> 7 -> 8
pub fn forked_tree() -> BlockTree {
	let mut tree = BlockTree::new(hash("0"));
	push_chain(&mut tree, "0", &["1", "2", "3", "4"]);
	push_chain(&mut tree, "1", &["5", "6", "7", "8"]);
	tree
}

/// Append a chain of labelled blocks under `parent`, one number per block.
pub fn push_chain(tree: &mut BlockTree, parent: &str, labels: &[&str]) -> Vec<BlockHash> {
	let mut parent_hash = hash(parent);
	let mut number = tree
		.block_number(parent_hash)
		.expect("parent pushed before its children");
	let mut added = Vec::new();
	for label in labels {
		number += 1;
		let block = Block::new(hash(label), number, parent_hash);
		tree.add_block(block).expect("labels are unique per tree");
		parent_hash = hash(label);
		added.push(parent_hash);
	}
	added
}

/// Signature oracle holding keys for a fixed list of voters. Signatures are
/// a keyed checksum of the payload: deterministic, forgeable, test-only.
#[derive(Clone, Debug)]
pub struct TestSigner {
	keys: Vec<VoterId>,
}

impl TestSigner {
	pub fn new<I, S>(keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<VoterId>,
	{
		Self {
			keys: keys.into_iter().map(Into::into).collect(),
		}
	}

	fn checksum(payload: &[u8], voter: &VoterId) -> u64 {
		let mut state: u64 = 0xcbf2_9ce4_8422_2325;
		for byte in payload.iter().chain(voter.as_bytes()) {
			state ^= u64::from(*byte);
			state = state.wrapping_mul(0x0000_0100_0000_01b3);
		}
		state
	}
}

impl SignatureOracle for TestSigner {
	fn sign(&self, payload: &[u8], voter: &VoterId) -> Result<Signature, Error> {
		if !self.keys.contains(voter) {
			return Err(Error::UnknownVoter(voter.clone()));
		}
		let mut bytes = voter.as_bytes().to_vec();
		bytes.extend_from_slice(&Self::checksum(payload, voter).to_le_bytes());
		Ok(Signature(bytes))
	}

	fn verify(&self, payload: &[u8], signature: &Signature, voter: &VoterId) -> bool {
		let mut expected = voter.as_bytes().to_vec();
		expected.extend_from_slice(&Self::checksum(payload, voter).to_le_bytes());
		signature.0 == expected
	}
}
