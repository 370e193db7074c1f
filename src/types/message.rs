//! The consensus-level view of a block or ballot: a vertex of the DAG.

use std::fmt::{self, Display, Formatter};

use datasize::DataSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    block::{BlockHash, BlockSummary, Justification, MessageType, ValidatorId},
    Timestamp,
};

/// Error constructing a `Message` from a block summary.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MessageError {
    /// A non-genesis message must cite at least one parent.
    #[error("non-genesis message {block_hash} has no parents")]
    MissingParents {
        /// The offending message.
        block_hash: BlockHash,
    },

    /// A ballot must have exactly one parent.
    #[error("ballot {block_hash} has {parent_count} parents instead of exactly one")]
    BallotParents {
        /// The offending message.
        block_hash: BlockHash,
        /// The number of parents the ballot cited.
        parent_count: usize,
    },
}

/// A vertex of the block DAG.
///
/// A message is the consensus-level view of a block or ballot: its identity, creator, citation
/// edges and position within its era. It is immutable once constructed and is only ever built
/// from a summary that passed validation.
///
/// The derived ordering compares by hash first, which makes any ordered collection of messages
/// deterministic for a given set of hashes.
#[derive(
    Clone, DataSize, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Message {
    hash: BlockHash,
    validator_id: ValidatorId,
    parents: Vec<BlockHash>,
    justifications: Vec<Justification>,
    rank: u64,
    j_rank: u64,
    sequence_number: u64,
    validator_prev_block_hash: Option<BlockHash>,
    timestamp: Timestamp,
    key_block_hash: BlockHash,
    message_type: MessageType,
}

impl Message {
    /// Constructs a message from a validated block summary.
    ///
    /// Fails if a non-genesis summary cites no parents, or if a ballot does not cite exactly one.
    pub fn from_block_summary(summary: &BlockSummary) -> Result<Self, MessageError> {
        let header = &summary.header;
        if header.parent_hashes.is_empty() && !summary.is_genesis_like() {
            return Err(MessageError::MissingParents {
                block_hash: summary.block_hash,
            });
        }
        if header.message_type == MessageType::Ballot && header.parent_hashes.len() != 1 {
            return Err(MessageError::BallotParents {
                block_hash: summary.block_hash,
                parent_count: header.parent_hashes.len(),
            });
        }
        Ok(Message {
            hash: summary.block_hash,
            validator_id: header.validator_id.clone(),
            parents: header.parent_hashes.clone(),
            justifications: header.justifications.clone(),
            rank: header.rank,
            j_rank: header.j_rank,
            sequence_number: header.validator_block_seq_num,
            validator_prev_block_hash: header.validator_prev_block_hash,
            timestamp: header.timestamp,
            key_block_hash: header.key_block_hash,
            message_type: header.message_type,
        })
    }

    /// Returns the message's hash.
    pub fn hash(&self) -> &BlockHash {
        &self.hash
    }

    /// Returns the message's creator; empty for genesis-like messages.
    pub fn validator_id(&self) -> &ValidatorId {
        &self.validator_id
    }

    /// Returns the message's parents; the first entry is the main parent.
    pub fn parents(&self) -> &[BlockHash] {
        &self.parents
    }

    /// Returns the main parent, if any.
    pub fn main_parent(&self) -> Option<&BlockHash> {
        self.parents.first()
    }

    /// Returns the message's justifications.
    pub fn justifications(&self) -> &[Justification] {
        &self.justifications
    }

    /// Returns an iterator over the hashes cited by the justifications.
    pub fn justification_hashes(&self) -> impl Iterator<Item = &BlockHash> {
        self.justifications
            .iter()
            .map(|justification| &justification.latest_block_hash)
    }

    /// Returns an iterator over all dependency hashes: parents followed by justifications.
    pub fn parents_and_justifications(&self) -> impl Iterator<Item = &BlockHash> {
        self.parents.iter().chain(self.justification_hashes())
    }

    /// Returns the message's rank: 1 + the maximum rank over parents and justifications.
    pub fn rank(&self) -> u64 {
        self.rank
    }

    /// Returns the rank computed over justifications alone.
    pub fn j_rank(&self) -> u64 {
        self.j_rank
    }

    /// Returns the creator's message counter.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Returns the hash of the creator's previous message, if any.
    pub fn validator_prev_block_hash(&self) -> Option<&BlockHash> {
        self.validator_prev_block_hash.as_ref()
    }

    /// Returns the message's creation time.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the key block identifying the era this message belongs to.
    pub fn key_block_hash(&self) -> &BlockHash {
        &self.key_block_hash
    }

    /// Returns whether the message is a block or a ballot.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Returns `true` if the message has no creator, i.e. is genesis-like.
    pub fn is_genesis_like(&self) -> bool {
        self.validator_id.is_empty()
    }

    /// Returns `true` if the message is a ballot.
    pub fn is_ballot(&self) -> bool {
        self.message_type == MessageType::Ballot
    }
}

impl Display for Message {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "message({} by {}, era {}, rank {})",
            self.hash, self.validator_id, self.key_block_hash, self.rank
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, TestRng, TestValidator};

    #[test]
    fn message_mirrors_the_summary() {
        let mut rng = TestRng::new();
        let validator = TestValidator::random(&mut rng);
        let genesis = testing::genesis_summary(vec![]);
        let summary = testing::signed_summary(
            testing::header_citing(&[&genesis], genesis.block_hash, 1, None, 10),
            &validator,
        );

        let message = Message::from_block_summary(&summary).expect("should build message");
        assert_eq!(message.hash(), &summary.block_hash);
        assert_eq!(message.validator_id(), &validator.id());
        assert_eq!(message.parents(), &[genesis.block_hash]);
        assert_eq!(message.rank(), 1);
        assert_eq!(message.sequence_number(), 1);
        assert_eq!(message.key_block_hash(), &genesis.block_hash);
        assert!(!message.is_genesis_like());
        assert!(!message.is_ballot());
    }

    #[test]
    fn non_genesis_message_requires_parents() {
        let mut rng = TestRng::new();
        let validator = TestValidator::random(&mut rng);
        let summary = testing::signed_summary(testing::basic_header(), &validator);

        assert_eq!(
            Message::from_block_summary(&summary),
            Err(MessageError::MissingParents {
                block_hash: summary.block_hash,
            })
        );
    }

    #[test]
    fn ballot_requires_exactly_one_parent() {
        let mut rng = TestRng::new();
        let validator = TestValidator::random(&mut rng);
        let mut header = testing::basic_header();
        header.message_type = MessageType::Ballot;
        header.parent_hashes = vec![BlockHash::random(&mut rng), BlockHash::random(&mut rng)];
        let summary = testing::signed_summary(header, &validator);

        assert_eq!(
            Message::from_block_summary(&summary),
            Err(MessageError::BallotParents {
                block_hash: summary.block_hash,
                parent_count: 2,
            })
        );
    }

    #[test]
    fn genesis_needs_no_parents() {
        let genesis = testing::genesis_summary(vec![]);
        let message = Message::from_block_summary(&genesis).expect("should build message");
        assert!(message.is_genesis_like());
        assert_eq!(message.rank(), 0);
        assert_eq!(message.sequence_number(), 0);
    }
}
