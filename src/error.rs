use crate::block::BlockHash;
use crate::voting::{RoundNumber, SetId, VoterId, VoterWeight};

/// Errors raised while importing votes, rotating authority sets or
/// verifying justifications.
///
/// None of these are fatal: malformed or unauthenticated input is dropped,
/// equivocations are recorded as evidence, and a `SafetyViolation` only
/// stalls finality while block production continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("invalid signature from voter {0}")]
	BadSignature(VoterId),

	#[error("voter {0} is not a member of the authority set")]
	UnknownVoter(VoterId),

	#[error("message is for round {got}, expected round {expected}")]
	WrongRound {
		got: RoundNumber,
		expected: RoundNumber,
	},

	#[error("message is for authority set {got}, expected set {expected}")]
	WrongSetId { got: SetId, expected: SetId },

	#[error("block {0} is not known to the chain")]
	UnknownBlock(BlockHash),

	#[error("block {0} is not a descendant of the round base {1}")]
	NotDescendantOfBase(BlockHash, BlockHash),

	#[error("aggregate weight {got} is below the supermajority threshold {threshold}")]
	InsufficientWeight {
		got: VoterWeight,
		threshold: VoterWeight,
	},

	#[error("justification carries an invalid signature from voter {0}")]
	InvalidSignature(VoterId),

	#[error("precommit target {0} is not equal to or a descendant of the finalized block {1}")]
	DescendantCheckFailed(BlockHash, BlockHash),

	#[error("more than one precommit from voter {0}")]
	DuplicateVoter(VoterId),

	#[error("round {0} has no valid estimate, finality is stalled")]
	SafetyViolation(RoundNumber),

	#[error("catch-up for round {0} could not be validated")]
	CatchUpFailure(RoundNumber),

	#[error("an authority set change is already pending")]
	PendingChange,

	#[error("round {0} has not finalized a block")]
	NotFinalized(RoundNumber),

	#[error("empty or zero-weight voter set")]
	EmptyVoterSet,

	#[error("unexpected block number for block {0}")]
	BadBlockNumber(BlockHash),
}
