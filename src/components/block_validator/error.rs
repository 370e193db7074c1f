use thiserror::Error;

use crate::{
    components::traits::BlockStorageError,
    crypto::hash::Digest,
    types::{BlockHash, DeployHash},
};

/// The reason a block failed validation.
///
/// `MissingBlocks` is retry-eligible: the block is stashed and its dependencies requested.
/// `InvalidUnslashableBlock` is dropped without penalizing the creator. Every other variant is
/// slashable: the block is recorded as invalid and its creator penalized per protocol.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InvalidBlock {
    /// Dependencies are absent from block storage; retry once they have been fetched.
    #[error("missing block dependencies: {missing:?}")]
    MissingBlocks {
        /// The absent dependencies.
        missing: Vec<BlockHash>,
    },

    /// The block is invalid in a way that cannot be pinned on a bonded validator.
    #[error("invalid unslashable block: {reason}")]
    InvalidUnslashableBlock {
        /// Human-readable description of the defect.
        reason: String,
    },

    /// The block hash does not match the canonical header encoding, or the body hash the body.
    #[error("block hash does not match the canonical header or body encoding")]
    InvalidBlockHash,

    /// The block's rank is not 1 + the maximum rank over its parents and justifications.
    #[error("block rank {got} does not match expected {expected}")]
    InvalidBlockNumber {
        /// The rank the block claims.
        got: u64,
        /// The rank derived from the block's dependencies.
        expected: u64,
    },

    /// The sequence number does not continue the creator's swimlane.
    #[error("sequence number {got} does not match expected {expected}")]
    InvalidSequenceNumber {
        /// The sequence number the block claims.
        got: u64,
        /// The sequence number derived from the creator's previous message.
        expected: u64,
    },

    /// The previous block hash does not resolve to the creator's previous message.
    #[error("validator previous block hash does not resolve to the creator's previous message")]
    InvalidPrevBlockHash,

    /// The block merges two forks of its equivocating creator's swimlane.
    #[error("the block merges equivocating forks of its creator's swimlane")]
    SwimlaneMerged,

    /// The parents do not match the fork choice over the block's justifications.
    #[error("parents {got:?} do not match the fork choice {expected:?}")]
    InvalidParents {
        /// The parents the fork choice selects.
        expected: Vec<BlockHash>,
        /// The parents the block cites.
        got: Vec<BlockHash>,
    },

    /// A deploy's hash does not match its header, or its body hash its body.
    #[error("deploy {deploy_hash} has a mismatched deploy or body hash")]
    InvalidDeployHash {
        /// The offending deploy.
        deploy_hash: DeployHash,
    },

    /// A deploy has no approvals, or one of its signatures does not verify.
    #[error("deploy {deploy_hash} has a missing or invalid signature")]
    InvalidDeploySignature {
        /// The offending deploy.
        deploy_hash: DeployHash,
    },

    /// A deploy header violates the chain's deploy rules.
    #[error("deploy {deploy_hash} has an invalid header: {reason}")]
    InvalidDeployHeader {
        /// The offending deploy.
        deploy_hash: DeployHash,
        /// Human-readable description of the defect.
        reason: String,
    },

    /// The header's deploy count does not match the body.
    #[error("deploy count {got} does not match the body ({expected})")]
    InvalidDeployCount {
        /// The count the header claims.
        got: u32,
        /// The number of deploys in the body.
        expected: u32,
    },

    /// A deploy occurs twice in the block, or already occurs in the block's p-past-cone.
    #[error("deploy {deploy_hash} is already included in the block or its past")]
    InvalidRepeatDeploy {
        /// The offending deploy.
        deploy_hash: DeployHash,
    },

    /// A deploy's time-to-live ran out before the block's timestamp.
    #[error("deploy {deploy_hash} expired before the block's timestamp")]
    DeployExpired {
        /// The offending deploy.
        deploy_hash: DeployHash,
    },

    /// A deploy is timestamped after the block including it.
    #[error("deploy {deploy_hash} is from the block's future")]
    DeployFromFuture {
        /// The offending deploy.
        deploy_hash: DeployHash,
    },

    /// A deploy dependency is not satisfied within the block's p-past-cone.
    #[error("dependency {dependency} of deploy {deploy_hash} is not met in the block's past")]
    DeployDependencyNotMet {
        /// The offending deploy.
        deploy_hash: DeployHash,
        /// The unmet dependency.
        dependency: DeployHash,
    },

    /// The chain name does not match the configured chain.
    #[error("chain name {got:?} does not match {expected:?}")]
    InvalidChainName {
        /// The configured chain name.
        expected: String,
        /// The name the block carries.
        got: String,
    },

    /// The bonds after committing the block's effects differ from the block's bond cache.
    #[error("post-state bonds do not match the block's bond cache")]
    InvalidBondsCache,

    /// The supplied pre-state differs from the one the block was built on.
    #[error("pre-state hash does not match the state computed from the parents")]
    InvalidPreStateHash,

    /// Committing the block's effects produced a different state root.
    #[error("post-state hash {got} does not match the committed state {expected}")]
    InvalidPostStateHash {
        /// The state root the engine computed.
        expected: Digest,
        /// The state root the block claims.
        got: Digest,
    },

    /// The execution engine failed to commit the block's effects.
    #[error("transaction execution failed: {reason}")]
    InvalidTransaction {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A ballot that does not cite exactly one parent.
    #[error("a ballot must have exactly one parent")]
    InvalidTargetHash,

    /// The block cites a known invalid block without slashing its creator.
    #[error("the block cites invalid block {cited} without slashing its creator")]
    NeglectedInvalidBlock {
        /// The invalid block being cited.
        cited: BlockHash,
    },

    /// The block store failed; not a verdict about the block.
    #[error(transparent)]
    Storage(#[from] BlockStorageError),
}

impl InvalidBlock {
    /// Returns `true` if the failure should be penalized: the block is provably the product of a
    /// misbehaving bonded validator.
    pub fn is_slashable(&self) -> bool {
        !matches!(
            self,
            InvalidBlock::MissingBlocks { .. }
                | InvalidBlock::InvalidUnslashableBlock { .. }
                | InvalidBlock::Storage(_)
        )
    }

    /// Returns `true` if the block should be dropped silently, without penalty.
    pub fn is_droppable(&self) -> bool {
        matches!(self, InvalidBlock::InvalidUnslashableBlock { .. })
    }
}
