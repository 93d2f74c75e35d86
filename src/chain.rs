use std::collections::HashMap;

use crate::block::{Block, BlockHash, BlockNumber};
use crate::error::Error;

/// Chain oracle consumed by the gadget. Implemented by whatever component
/// owns the block tree; the gadget itself never produces blocks.
pub trait Chain {
	/// Whether `descendant` is strictly below `ancestor` in the tree.
	fn is_descendant(&self, ancestor: BlockHash, descendant: BlockHash) -> bool;

	/// Head of the best chain containing `base`, if `base` is known.
	fn best_chain_containing(&self, base: BlockHash) -> Option<(BlockHash, BlockNumber)>;

	fn block_number(&self, hash: BlockHash) -> Option<BlockNumber>;

	/// The hashes on the path from `block` back to `base`, inclusive of
	/// both ends, ordered from `block` downwards. Fails if either block is
	/// unknown or `block` does not descend from `base`.
	fn ancestry(&self, base: BlockHash, block: BlockHash) -> Result<Vec<BlockHash>, Error>;

	fn is_equal_or_descendant(&self, ancestor: BlockHash, descendant: BlockHash) -> bool {
		ancestor == descendant || self.is_descendant(ancestor, descendant)
	}
}

/// In-memory block arena with parent pointers. Ancestry queries walk parent
/// links, bounded by the block number difference.
#[derive(Debug, Clone)]
pub struct BlockTree {
	genesis: BlockHash,
	best: BlockHash,
	blocks: HashMap<BlockHash, Block>,
}

impl BlockTree {
	pub fn new(genesis: BlockHash) -> Self {
		let mut blocks = HashMap::new();
		blocks.insert(genesis, Block::new(genesis, 0, genesis));
		Self {
			genesis,
			best: genesis,
			blocks,
		}
	}

	pub fn genesis(&self) -> BlockHash {
		self.genesis
	}

	pub fn add_block(&mut self, block: Block) -> Result<(), Error> {
		let parent = self
			.blocks
			.get(&block.parent)
			.ok_or(Error::UnknownBlock(block.parent))?;
		if block.number <= parent.number {
			return Err(Error::BadBlockNumber(block.hash));
		}
		if self.blocks.contains_key(&block.hash) {
			return Ok(());
		}

		let best_number = self.blocks[&self.best].number;
		if block.number > best_number {
			self.best = block.hash;
		}
		self.blocks.insert(block.hash, block);
		Ok(())
	}

	pub fn get_block(&self, hash: BlockHash) -> Option<&Block> {
		self.blocks.get(&hash)
	}

	pub fn best(&self) -> (BlockHash, BlockNumber) {
		(self.best, self.blocks[&self.best].number)
	}

	fn leaves(&self) -> impl Iterator<Item = &Block> {
		self.blocks
			.values()
			.filter(move |block| {
				!self
					.blocks
					.values()
					.any(|b| b.parent == block.hash && b.hash != block.hash)
			})
	}
}

impl Chain for BlockTree {
	fn is_descendant(&self, ancestor: BlockHash, descendant: BlockHash) -> bool {
		if ancestor == descendant {
			return false;
		}
		let ancestor_number = match self.blocks.get(&ancestor) {
			Some(block) => block.number,
			None => return false,
		};
		let mut current = match self.blocks.get(&descendant) {
			Some(block) => block,
			None => return false,
		};
		while current.number > ancestor_number {
			if current.parent == ancestor {
				return true;
			}
			current = match self.blocks.get(&current.parent) {
				Some(block) => block,
				None => return false,
			};
		}
		false
	}

	fn best_chain_containing(&self, base: BlockHash) -> Option<(BlockHash, BlockNumber)> {
		if !self.blocks.contains_key(&base) {
			return None;
		}
		self.leaves()
			.filter(|leaf| self.is_equal_or_descendant(base, leaf.hash))
			.map(|leaf| (leaf.hash, leaf.number))
			// The fork-choice rule lives with the block tree owner; longest
			// chain with a stable tie-break stands in for it here.
			.max_by_key(|(hash, number)| (*number, *hash))
	}

	fn block_number(&self, hash: BlockHash) -> Option<BlockNumber> {
		self.blocks.get(&hash).map(|block| block.number)
	}

	fn ancestry(&self, base: BlockHash, block: BlockHash) -> Result<Vec<BlockHash>, Error> {
		let base_number = self
			.blocks
			.get(&base)
			.ok_or(Error::UnknownBlock(base))?
			.number;
		let mut current = self.blocks.get(&block).ok_or(Error::UnknownBlock(block))?;

		let mut path = vec![current.hash];
		while current.number > base_number {
			current = self
				.blocks
				.get(&current.parent)
				.ok_or(Error::UnknownBlock(current.parent))?;
			path.push(current.hash);
		}

		if current.hash != base {
			return Err(Error::NotDescendantOfBase(block, base));
		}
		Ok(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::hash;

	fn forked_tree() -> BlockTree {
		//  0 -> 1 -> 2 -> 3 -> 4
		//        \-> 5 -> 6 -> 7 -> 8
		let mut tree = BlockTree::new(hash("0"));
		tree.add_block(Block::new(hash("1"), 1, hash("0"))).unwrap();
		tree.add_block(Block::new(hash("2"), 2, hash("1"))).unwrap();
		tree.add_block(Block::new(hash("3"), 3, hash("2"))).unwrap();
		tree.add_block(Block::new(hash("4"), 4, hash("3"))).unwrap();
		tree.add_block(Block::new(hash("5"), 2, hash("1"))).unwrap();
		tree.add_block(Block::new(hash("6"), 3, hash("5"))).unwrap();
		tree.add_block(Block::new(hash("7"), 4, hash("6"))).unwrap();
		tree.add_block(Block::new(hash("8"), 5, hash("7"))).unwrap();
		tree
	}

	#[test]
	fn ancestry_walks_parent_links() {
		let tree = forked_tree();
		assert_eq!(
			tree.ancestry(hash("1"), hash("4")).unwrap(),
			vec![hash("4"), hash("3"), hash("2"), hash("1")],
		);
		assert_eq!(
			tree.ancestry(hash("2"), hash("8")),
			Err(Error::NotDescendantOfBase(hash("8"), hash("2"))),
		);
	}

	#[test]
	fn descendancy_across_forks() {
		let tree = forked_tree();
		assert!(tree.is_descendant(hash("1"), hash("4")));
		assert!(tree.is_descendant(hash("1"), hash("8")));
		assert!(!tree.is_descendant(hash("2"), hash("8")));
		assert!(!tree.is_descendant(hash("4"), hash("4")));
		assert!(tree.is_equal_or_descendant(hash("4"), hash("4")));
	}

	#[test]
	fn best_chain_respects_base() {
		let tree = forked_tree();
		assert_eq!(tree.best_chain_containing(hash("1")), Some((hash("8"), 5)));
		assert_eq!(tree.best_chain_containing(hash("2")), Some((hash("4"), 4)));
		assert_eq!(tree.best_chain_containing(hash("unknown")), None);
	}

	#[test]
	fn rejects_orphan_blocks() {
		let mut tree = BlockTree::new(hash("0"));
		assert_eq!(
			tree.add_block(Block::new(hash("2"), 2, hash("1"))),
			Err(Error::UnknownBlock(hash("1"))),
		);
	}
}
