//! Blocks, block summaries and the types their headers are built from.

use std::fmt::{self, Debug, Display, Formatter};

use datasize::DataSize;
use hex_fmt::HexFmt;
#[cfg(test)]
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{deploy::Deploy, Timestamp};
use crate::{
    crypto::hash::{self, Digest},
    utils::DisplayIter,
};
#[cfg(test)]
use crate::testing::TestRng;

/// The cryptographic hash of a block; the identity of a message in the DAG.
#[derive(
    Copy, Clone, DataSize, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
pub struct BlockHash(Digest);

impl BlockHash {
    /// Constructs a new `BlockHash`.
    pub fn new(hash: Digest) -> Self {
        BlockHash(hash)
    }

    /// Returns the wrapped inner hash.
    pub fn inner(&self) -> &Digest {
        &self.0
    }

    /// Returns `true` if this is the all-zero hash, the wire encoding of an absent hash.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Generates a random instance using a `TestRng`.
    #[cfg(test)]
    pub fn random(rng: &mut TestRng) -> Self {
        BlockHash(Digest::random(rng))
    }
}

impl Display for BlockHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "block-hash({})", self.0)
    }
}

impl Debug for BlockHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:?}", self.0)
    }
}

impl From<Digest> for BlockHash {
    fn from(digest: Digest) -> Self {
        BlockHash(digest)
    }
}

/// A validator's identity: the raw bytes of its public key. Empty for genesis-like messages.
#[derive(
    Clone, DataSize, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct ValidatorId(Vec<u8>);

impl ValidatorId {
    /// Constructs a new `ValidatorId` from raw public key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        ValidatorId(bytes)
    }

    /// Returns `true` if the identity is empty, i.e. the message is genesis-like.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Generates a random instance using a `TestRng`.
    #[cfg(test)]
    pub fn random(rng: &mut TestRng) -> Self {
        ValidatorId(rng.gen::<[u8; 32]>().to_vec())
    }
}

impl Display for ValidatorId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:10}", HexFmt(&self.0))
    }
}

impl Debug for ValidatorId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", HexFmt(&self.0))
    }
}

impl From<&[u8]> for ValidatorId {
    fn from(bytes: &[u8]) -> Self {
        ValidatorId(bytes.to_vec())
    }
}

/// The version of the protocol a block was created under.
#[derive(
    Copy,
    Clone,
    DataSize,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct ProtocolVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl ProtocolVersion {
    /// Version 1.0.0.
    pub const V1_0_0: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

    /// Constructs a new `ProtocolVersion`.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        ProtocolVersion {
            major,
            minor,
            patch,
        }
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A reference to another validator's latest message, as cited by a block header.
#[derive(
    Clone, DataSize, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Justification {
    /// The validator whose message is cited.
    pub validator_id: ValidatorId,
    /// The hash of the cited message.
    pub latest_block_hash: BlockHash,
}

impl Display for Justification {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "justification({} by {})",
            self.latest_block_hash, self.validator_id
        )
    }
}

/// A bonded validator and its stake.
#[derive(
    Clone, DataSize, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Bond {
    /// The bonded validator.
    pub validator_id: ValidatorId,
    /// The validator's stake.
    pub stake: u64,
}

/// Whether a message proposes deploys or is a bare vote.
#[derive(
    Copy, Clone, DataSize, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub enum MessageType {
    /// Carries deploys and modifies global state.
    Block,
    /// A vote: exactly one parent and no deploys.
    Ballot,
}

/// The header of a block; everything the block hash commits to.
#[derive(Clone, DataSize, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Hashes of the parent blocks; the first entry is the main parent.
    pub parent_hashes: Vec<BlockHash>,
    /// The latest messages the creator had seen, one entry per cited validator.
    pub justifications: Vec<Justification>,
    /// The creator of this block; empty for genesis-like blocks.
    pub validator_id: ValidatorId,
    /// The hash of the creator's previous message, if any.
    pub validator_prev_block_hash: Option<BlockHash>,
    /// The creator's message counter; `seq_num(prev) + 1`, or `1` for a first message.
    pub validator_block_seq_num: u64,
    /// The key block identifying the era this block belongs to.
    pub key_block_hash: BlockHash,
    /// 1 + the maximum rank over parents and justifications; 0 for genesis-like blocks.
    pub rank: u64,
    /// 1 + the maximum rank over justifications alone.
    pub j_rank: u64,
    /// Creation time.
    pub timestamp: Timestamp,
    /// Hash of the block body.
    pub body_hash: Digest,
    /// The global state hash the block's effects are applied on.
    pub pre_state_hash: Digest,
    /// The global state hash after the block's effects.
    pub post_state_hash: Digest,
    /// The bonded validator set at this block's state.
    pub bonds: Vec<Bond>,
    /// The number of deploys in the body.
    pub deploy_count: u32,
    /// The protocol version the block was created under.
    pub protocol_version: ProtocolVersion,
    /// The name of the chain this block belongs to.
    pub chain_name: String,
    /// Whether this is a proposal or a bare vote.
    pub message_type: MessageType,
}

impl BlockHeader {
    /// Computes the block hash from the canonical encoding of this header.
    pub fn compute_hash(&self) -> BlockHash {
        BlockHash::new(hash::hash(
            &bincode::serialize(self).expect("serialize block header"),
        ))
    }

    /// Returns an iterator over the hashes cited by the justifications.
    pub fn justification_hashes(&self) -> impl Iterator<Item = &BlockHash> {
        self.justifications
            .iter()
            .map(|justification| &justification.latest_block_hash)
    }

    /// Returns an iterator over all dependency hashes: parents followed by justifications.
    pub fn parents_and_justifications(&self) -> impl Iterator<Item = &BlockHash> {
        self.parent_hashes.iter().chain(self.justification_hashes())
    }
}

/// A block's hash, header and signature: enough for structural validation and DAG insertion.
#[derive(Clone, DataSize, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockSummary {
    /// The claimed block hash.
    pub block_hash: BlockHash,
    /// The block header.
    pub header: BlockHeader,
    /// The creator's signature over the block hash; empty for genesis-like blocks.
    pub signature: Vec<u8>,
    /// The name of the signature algorithm; empty for genesis-like blocks.
    pub signature_algorithm: String,
}

impl BlockSummary {
    /// Returns `true` if this summary represents a genesis-like block, i.e. one with no creator.
    pub fn is_genesis_like(&self) -> bool {
        self.header.validator_id.is_empty()
    }
}

impl Display for BlockSummary {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "block-summary({}, rank {}, by {})",
            self.block_hash, self.header.rank, self.header.validator_id
        )
    }
}

/// The body of a block: the deploys it carries.
#[derive(Clone, DataSize, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockBody {
    /// The deploys, in execution order.
    pub deploys: Vec<Deploy>,
}

impl BlockBody {
    /// Computes the body hash from the canonical encoding of this body.
    pub fn compute_hash(&self) -> Digest {
        hash::hash(&bincode::serialize(self).expect("serialize block body"))
    }
}

/// A complete block: summary plus body.
#[derive(Clone, DataSize, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// The block's summary.
    pub summary: BlockSummary,
    /// The block's body, if downloaded.
    pub body: Option<BlockBody>,
}

impl Block {
    /// Returns the block's hash.
    pub fn block_hash(&self) -> &BlockHash {
        &self.summary.block_hash
    }

    /// Returns the block's header.
    pub fn header(&self) -> &BlockHeader {
        &self.summary.header
    }

    /// Returns `true` if this is a genesis-like block.
    pub fn is_genesis_like(&self) -> bool {
        self.summary.is_genesis_like()
    }
}

impl Display for Block {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "block({}, rank {}, parents [{}])",
            self.summary.block_hash,
            self.summary.header.rank,
            DisplayIter::new(self.summary.header.parent_hashes.iter()),
        )
    }
}

/// A light record of a stored message, as produced by topological enumeration.
#[derive(Clone, DataSize, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BlockInfo {
    /// The message's hash.
    pub block_hash: BlockHash,
    /// The message's creator.
    pub validator_id: ValidatorId,
    /// The message's rank.
    pub rank: u64,
}

impl Display for BlockInfo {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "block-info({}, rank {})",
            self.block_hash, self.rank
        )
    }
}
