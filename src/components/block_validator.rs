//! Block validation pipeline.
//!
//! Two entry points: [`validate_summary`](struct.BlockValidator.html#method.validate_summary)
//! checks a header-only summary before the body is downloaded, and
//! [`validate_block`](struct.BlockValidator.html#method.validate_block) checks a complete block
//! against the DAG. Checks run in a fixed order and stop at the first failure, which is logged
//! and raised as a typed [`InvalidBlock`](enum.InvalidBlock.html) reason.
//!
//! Failures fall into three classes: `MissingBlocks` is recoverable once the dependencies have
//! been fetched, `InvalidUnslashableBlock` drops the block without penalty, and everything else
//! records the block as invalid and penalizes its creator.

mod error;


use std::{
    collections::{HashMap, HashSet, VecDeque},
    convert::TryFrom,
    fmt::{self, Debug, Formatter},
    sync::{Arc, RwLock},
};

use datasize::DataSize;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    dag_store::DagRepresentation,
    traits::{BlockStorage, ExecutionEffects, ExecutionEngine, ForkChoice},
};
use crate::{
    crypto::{asymmetric_key, hash::Digest},
    types::{
        Block, BlockHash, BlockHeader, BlockSummary, Deploy, DeployHash, Message, MessageType,
        ProtocolVersion, TimeDiff, Timestamp,
    },
};

pub use error::InvalidBlock;

/// How far into the future a block's timestamp may lie, relative to local time.
pub const DRIFT: TimeDiff = TimeDiff::from_millis(15_000);
/// The smallest time-to-live a deploy may carry.
pub const MIN_TTL: TimeDiff = TimeDiff::from_seconds(60 * 60);
/// The largest time-to-live a deploy may carry.
pub const MAX_TTL: TimeDiff = TimeDiff::from_seconds(24 * 60 * 60);
/// The maximum number of dependencies a deploy may carry.
pub const MAX_DEPENDENCIES: usize = 10;

/// A protocol version and the first rank it applies to.
#[derive(Copy, Clone, DataSize, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActivationPoint {
    /// The first rank the version applies to.
    pub rank: u64,
    /// The version active from that rank on.
    pub version: ProtocolVersion,
}

/// Validation pipeline configuration.
#[derive(Clone, DataSize, Debug, Serialize, Deserialize)]
pub struct Config {
    /// The name of the chain this node validates for.
    pub chain_name: String,
    /// The genesis block hash, once known; enables the parent canonicality check.
    pub genesis_block_hash: Option<BlockHash>,
    /// Protocol versions by the rank they activate at, ascending.
    pub protocol_versions: Vec<ActivationPoint>,
}

impl Config {
    /// Creates a configuration for the given chain, with protocol version 1.0.0 from rank 0.
    pub fn new<T: Into<String>>(chain_name: T) -> Self {
        Config {
            chain_name: chain_name.into(),
            genesis_block_hash: None,
            protocol_versions: vec![ActivationPoint {
                rank: 0,
                version: ProtocolVersion::V1_0_0,
            }],
        }
    }

    /// Returns the protocol version active at `rank`, if one is configured.
    pub fn version_at(&self, rank: u64) -> Option<ProtocolVersion> {
        self.protocol_versions
            .iter()
            .rev()
            .find(|point| point.rank <= rank)
            .map(|point| point.version)
    }
}

/// The externally computed execution context for the transactions check.
#[derive(Clone, Debug)]
pub struct BlockEffects {
    /// The pre-state computed from the block's parents.
    pub pre_state_hash: Digest,
    /// The merged transform effects of the block's deploys.
    pub effects: ExecutionEffects,
}

/// The block validation pipeline.
///
/// Distinct blocks may be validated concurrently against the same DAG; validation never writes
/// to it.
pub struct BlockValidator<S, E> {
    config: Config,
    block_storage: Arc<S>,
    execution_engine: Arc<E>,
    fork_choice: Option<Arc<dyn ForkChoice>>,
    /// Hashes of blocks that failed a slashable check.
    invalid_blocks: RwLock<HashSet<BlockHash>>,
}

impl<S, E> Debug for BlockValidator<S, E> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BlockValidator")
            .field("config", &self.config)
            .finish()
    }
}

impl<S, E> BlockValidator<S, E>
where
    S: BlockStorage,
    E: ExecutionEngine,
{
    /// Creates a new validation pipeline.
    pub fn new(config: Config, block_storage: Arc<S>, execution_engine: Arc<E>) -> Self {
        BlockValidator {
            config,
            block_storage,
            execution_engine,
            fork_choice: None,
            invalid_blocks: RwLock::new(HashSet::new()),
        }
    }

    /// Sets the fork choice consulted for parent canonicality.
    pub fn with_fork_choice(mut self, fork_choice: Arc<dyn ForkChoice>) -> Self {
        self.fork_choice = Some(fork_choice);
        self
    }

    /// Returns the pipeline's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns whether `block_hash` has been recorded as slashably invalid.
    pub fn is_known_invalid(&self, block_hash: &BlockHash) -> bool {
        self.invalid_blocks
            .read()
            .expect("invalid block set lock poisoned")
            .contains(block_hash)
    }

    /// Validates a header-only summary, before the body is downloaded.
    pub fn validate_summary(&self, summary: &BlockSummary) -> Result<(), InvalidBlock> {
        let result = self.validate_summary_inner(summary);
        self.record_outcome(&summary.block_hash, result)
    }

    /// Validates a complete block against the DAG.
    ///
    /// The summary checks are re-run first. `effects` carries the externally computed pre-state
    /// and transform effects; when absent, the transactions check is skipped. Cancelling the
    /// returned future has no effect on durable state.
    pub async fn validate_block(
        &self,
        block: &Block,
        dag: &DagRepresentation,
        effects: Option<&BlockEffects>,
    ) -> Result<(), InvalidBlock> {
        self.validate_block_at(block, dag, effects, Timestamp::now())
            .await
    }

    /// Like [`validate_block`](#method.validate_block), with an explicit notion of "now".
    pub(crate) async fn validate_block_at(
        &self,
        block: &Block,
        dag: &DagRepresentation,
        effects: Option<&BlockEffects>,
        now: Timestamp,
    ) -> Result<(), InvalidBlock> {
        let result = self.validate_block_inner(block, dag, effects, now).await;
        self.record_outcome(block.block_hash(), result)
    }

    /// Logs a failure and records the block when the failure is slashable.
    fn record_outcome(
        &self,
        block_hash: &BlockHash,
        result: Result<(), InvalidBlock>,
    ) -> Result<(), InvalidBlock> {
        if let Err(error) = &result {
            warn!(%block_hash, %error, "block validation failed");
            if error.is_slashable() {
                self.invalid_blocks
                    .write()
                    .expect("invalid block set lock poisoned")
                    .insert(*block_hash);
            }
        }
        result
    }

    fn validate_summary_inner(&self, summary: &BlockSummary) -> Result<(), InvalidBlock> {
        let header = &summary.header;

        // Format of fields.
        if summary.block_hash.is_zero() {
            return Err(unslashable("block hash is empty"));
        }
        if header.chain_name.is_empty() {
            return Err(unslashable("chain name is empty"));
        }
        if header.body_hash.is_zero() {
            return Err(unslashable("body hash is empty"));
        }
        if header.post_state_hash.is_zero() {
            return Err(unslashable("post-state hash is empty"));
        }
        if summary.is_genesis_like() {
            if !summary.signature.is_empty() || !summary.signature_algorithm.is_empty() {
                return Err(unslashable("genesis-like block carries a signature"));
            }
        } else if summary.signature.is_empty() || summary.signature_algorithm.is_empty() {
            return Err(unslashable("missing signature or signature algorithm"));
        }

        // Protocol version.
        match self.config.version_at(header.rank) {
            None => {
                return Err(unslashable(format!(
                    "no protocol version configured at rank {}",
                    header.rank
                )));
            }
            Some(version) if version != header.protocol_version => {
                return Err(unslashable(format!(
                    "protocol version {} at rank {}, expected {}",
                    header.protocol_version, header.rank, version
                )));
            }
            Some(_) => (),
        }

        // Signature.
        if !summary.is_genesis_like() {
            asymmetric_key::verify(
                summary.block_hash.inner().as_ref(),
                &summary.signature,
                header.validator_id.as_bytes(),
                &summary.signature_algorithm,
            )
            .map_err(|error| unslashable(format!("signature verification failed: {}", error)))?;
        }

        // Summary hash.
        if summary.block_hash != header.compute_hash() {
            return Err(InvalidBlock::InvalidBlockHash);
        }

        // Chain identifier.
        if header.chain_name != self.config.chain_name {
            return Err(InvalidBlock::InvalidChainName {
                expected: self.config.chain_name.clone(),
                got: header.chain_name.clone(),
            });
        }

        // Ballot shape.
        if header.message_type == MessageType::Ballot && header.parent_hashes.len() != 1 {
            return Err(InvalidBlock::InvalidTargetHash);
        }

        Ok(())
    }

    async fn validate_block_inner(
        &self,
        block: &Block,
        dag: &DagRepresentation,
        effects: Option<&BlockEffects>,
        now: Timestamp,
    ) -> Result<(), InvalidBlock> {
        let summary = &block.summary;
        let header = &summary.header;

        self.validate_summary_inner(summary)?;

        let body = block
            .body
            .as_ref()
            .ok_or_else(|| unslashable("block body is missing"))?;

        // Bonded sender.
        if !summary.is_genesis_like() {
            let bonded = header
                .bonds
                .iter()
                .any(|bond| bond.validator_id == header.validator_id && bond.stake > 0);
            if !bonded {
                return Err(unslashable(format!(
                    "creator {} is not bonded",
                    header.validator_id
                )));
            }
        }

        // Missing dependencies: everything cited must be in block storage and in the DAG.
        let dependencies: Vec<BlockHash> = header
            .parents_and_justifications()
            .unique()
            .cloned()
            .collect();
        let mut missing = Vec::new();
        let mut resolved = Vec::new();
        for dependency in &dependencies {
            if !self.block_storage.contains(dependency).await? {
                missing.push(*dependency);
                continue;
            }
            match dag.lookup(dependency) {
                Some(message) => resolved.push(message),
                None => missing.push(*dependency),
            }
        }
        if !missing.is_empty() {
            return Err(InvalidBlock::MissingBlocks { missing });
        }

        // Timestamp window.
        let min_timestamp = resolved
            .iter()
            .map(Message::timestamp)
            .max()
            .unwrap_or_else(Timestamp::zero);
        if header.timestamp < min_timestamp || header.timestamp > now + DRIFT {
            return Err(unslashable(format!(
                "timestamp {} outside [{}, {}]",
                header.timestamp,
                min_timestamp,
                now + DRIFT
            )));
        }

        // Rank.
        let expected_rank = resolved.iter().map(Message::rank).max().map_or(0, |rank| rank + 1);
        if header.rank != expected_rank {
            return Err(InvalidBlock::InvalidBlockNumber {
                got: header.rank,
                expected: expected_rank,
            });
        }

        // Previous message and sequence number. A first message continues the absent predecessor
        // with sequence number 1; genesis-like blocks sit at 0.
        let expected_seq = if summary.is_genesis_like() {
            0
        } else {
            match header.validator_prev_block_hash {
                Some(prev_hash) => {
                    let previous = dag.lookup(&prev_hash).ok_or(InvalidBlock::MissingBlocks {
                        missing: vec![prev_hash],
                    })?;
                    if previous.validator_id() != &header.validator_id {
                        return Err(InvalidBlock::InvalidPrevBlockHash);
                    }
                    let cites_previous = header.justifications.iter().any(|justification| {
                        justification.validator_id == header.validator_id
                            && justification.latest_block_hash == prev_hash
                    });
                    if !cites_previous {
                        return Err(InvalidBlock::InvalidPrevBlockHash);
                    }
                    previous.sequence_number() + 1
                }
                None => 1,
            }
        };
        if header.validator_block_seq_num != expected_seq {
            return Err(InvalidBlock::InvalidSequenceNumber {
                got: header.validator_block_seq_num,
                expected: expected_seq,
            });
        }

        // Swimlane merging by a known equivocator.
        if let Some(base_rank) = dag.equivocation_base_rank(&header.validator_id) {
            self.validate_swimlane(summary, dag, base_rank)?;
        }

        // Neglected invalid blocks among the justifications.
        {
            let invalid = self
                .invalid_blocks
                .read()
                .expect("invalid block set lock poisoned");
            if let Some(cited) = header
                .justification_hashes()
                .find(|hash| invalid.contains(hash))
            {
                return Err(InvalidBlock::NeglectedInvalidBlock { cited: *cited });
            }
        }

        // Body hash.
        if header.body_hash != body.compute_hash() {
            return Err(InvalidBlock::InvalidBlockHash);
        }

        // Deploy count.
        if header.deploy_count as usize != body.deploys.len() {
            return Err(InvalidBlock::InvalidDeployCount {
                got: header.deploy_count,
                expected: body.deploys.len() as u32,
            });
        }

        // Per-deploy hashes, signatures and header rules.
        for deploy in &body.deploys {
            self.validate_deploy(deploy, header)?;
        }

        // Deploy dependencies and uniqueness, against the block's p-past-cone.
        let past = p_past_cone(dag, &header.parent_hashes);
        let mut seen = HashSet::new();
        for deploy in &body.deploys {
            if !seen.insert(deploy.deploy_hash) {
                return Err(InvalidBlock::InvalidRepeatDeploy {
                    deploy_hash: deploy.deploy_hash,
                });
            }
            for dependency in &deploy.header.dependencies {
                let dependency = match Digest::try_from(dependency.as_slice()) {
                    Ok(digest) => DeployHash::new(digest),
                    Err(_) => {
                        return Err(InvalidBlock::InvalidDeployHeader {
                            deploy_hash: deploy.deploy_hash,
                            reason: "dependency is not a 32-byte hash".to_string(),
                        });
                    }
                };
                let including = self
                    .block_storage
                    .find_block_hashes_with_deploy_hash(&dependency)
                    .await?;
                if !including.iter().any(|hash| past.contains(hash)) {
                    return Err(InvalidBlock::DeployDependencyNotMet {
                        deploy_hash: deploy.deploy_hash,
                        dependency,
                    });
                }
            }
            let including = self
                .block_storage
                .find_block_hashes_with_deploy_hash(&deploy.deploy_hash)
                .await?;
            if including.iter().any(|hash| past.contains(hash)) {
                return Err(InvalidBlock::InvalidRepeatDeploy {
                    deploy_hash: deploy.deploy_hash,
                });
            }
        }

        // Parent canonicality, once a genesis hash is known.
        if let (Some(fork_choice), Some(_)) = (&self.fork_choice, self.config.genesis_block_hash) {
            if !summary.is_genesis_like() {
                let expected = fork_choice.expected_parents(dag, &header.justifications);
                if header.parent_hashes != expected {
                    return Err(InvalidBlock::InvalidParents {
                        expected,
                        got: header.parent_hashes.clone(),
                    });
                }
            }
        }

        // Transactions.
        if let Some(effects) = effects {
            if effects.pre_state_hash != header.pre_state_hash {
                return Err(InvalidBlock::InvalidPreStateHash);
            }
            let committed = self
                .execution_engine
                .commit(effects.pre_state_hash, &effects.effects, header.protocol_version)
                .await
                .map_err(|error| InvalidBlock::InvalidTransaction {
                    reason: error.to_string(),
                })?;
            if committed.post_state_hash != header.post_state_hash {
                return Err(InvalidBlock::InvalidPostStateHash {
                    expected: committed.post_state_hash,
                    got: header.post_state_hash,
                });
            }
            if committed.bonded_validators != header.bonds {
                return Err(InvalidBlock::InvalidBondsCache);
            }
        }

        Ok(())
    }

    /// Walks the creator's swimlane within the block's j-past-cone, down to the creator's
    /// equivocation base rank. Citing more than one fork of the swimlane is rejected.
    fn validate_swimlane(
        &self,
        summary: &BlockSummary,
        dag: &DagRepresentation,
        base_rank: u64,
    ) -> Result<(), InvalidBlock> {
        let creator = &summary.header.validator_id;
        let mut lane: HashMap<BlockHash, Message> = HashMap::new();
        let mut visited: HashSet<BlockHash> = summary
            .header
            .justification_hashes()
            .cloned()
            .collect();
        let mut queue: VecDeque<BlockHash> = visited.iter().cloned().collect();
        while let Some(hash) = queue.pop_front() {
            let message = match dag.lookup(&hash) {
                Some(message) => message,
                None => continue,
            };
            if message.rank() < base_rank {
                continue;
            }
            let descend = message.rank() > base_rank;
            if message.validator_id() == creator {
                lane.insert(hash, message.clone());
            }
            if descend {
                for cited in message.justification_hashes() {
                    if visited.insert(*cited) {
                        queue.push_back(*cited);
                    }
                }
            }
        }

        // Within a single fork the collected messages chain through their predecessor links, so
        // a second chain head means two forks are being cited.
        let predecessors: HashSet<BlockHash> = lane
            .values()
            .filter_map(|message| message.validator_prev_block_hash().copied())
            .collect();
        let fork_heads = lane
            .keys()
            .filter(|hash| !predecessors.contains(hash))
            .count();
        if fork_heads >= 2 {
            warn!(
                block_hash = %summary.block_hash,
                validator = %creator,
                "block merges its creator's equivocating swimlane forks"
            );
            return Err(InvalidBlock::SwimlaneMerged);
        }
        Ok(())
    }

    /// Checks a deploy's hashes, approvals and header rules against the including block.
    fn validate_deploy(
        &self,
        deploy: &Deploy,
        block_header: &BlockHeader,
    ) -> Result<(), InvalidBlock> {
        let deploy_hash = deploy.deploy_hash;
        if deploy.header.compute_hash() != deploy_hash
            || deploy.header.body_hash != deploy.body.compute_hash()
        {
            return Err(InvalidBlock::InvalidDeployHash { deploy_hash });
        }
        if deploy.approvals.is_empty() {
            return Err(InvalidBlock::InvalidDeploySignature { deploy_hash });
        }
        for approval in &deploy.approvals {
            if asymmetric_key::verify(
                deploy_hash.inner().as_ref(),
                &approval.signature,
                &approval.signer,
                &approval.signature_algorithm,
            )
            .is_err()
            {
                return Err(InvalidBlock::InvalidDeploySignature { deploy_hash });
            }
        }

        let header = &deploy.header;
        if header.ttl < MIN_TTL || header.ttl > MAX_TTL {
            return Err(InvalidBlock::InvalidDeployHeader {
                deploy_hash,
                reason: format!("ttl {} outside [{}, {}]", header.ttl, MIN_TTL, MAX_TTL),
            });
        }
        if header.dependencies.len() > MAX_DEPENDENCIES {
            return Err(InvalidBlock::InvalidDeployHeader {
                deploy_hash,
                reason: format!(
                    "{} dependencies exceed the maximum of {}",
                    header.dependencies.len(),
                    MAX_DEPENDENCIES
                ),
            });
        }
        if let Some(dependency) = header
            .dependencies
            .iter()
            .find(|dependency| dependency.len() != Digest::LENGTH)
        {
            return Err(InvalidBlock::InvalidDeployHeader {
                deploy_hash,
                reason: format!("dependency of {} bytes is not a 32-byte hash", dependency.len()),
            });
        }
        if !header.chain_name.is_empty() && header.chain_name != block_header.chain_name {
            return Err(InvalidBlock::InvalidDeployHeader {
                deploy_hash,
                reason: format!(
                    "chain name {:?} does not match the block's {:?}",
                    header.chain_name, block_header.chain_name
                ),
            });
        }
        if block_header.timestamp < header.timestamp {
            return Err(InvalidBlock::DeployFromFuture { deploy_hash });
        }
        if block_header.timestamp > header.timestamp + header.ttl {
            return Err(InvalidBlock::DeployExpired { deploy_hash });
        }
        Ok(())
    }
}

/// Creates a droppable failure with the given reason.
fn unslashable<T: Into<String>>(reason: T) -> InvalidBlock {
    InvalidBlock::InvalidUnslashableBlock {
        reason: reason.into(),
    }
}

/// Returns the transitive closure of the given parents, including the parents themselves.
fn p_past_cone(dag: &DagRepresentation, parents: &[BlockHash]) -> HashSet<BlockHash> {
    let mut cone: HashSet<BlockHash> = parents.iter().cloned().collect();
    let mut queue: VecDeque<BlockHash> = parents.iter().cloned().collect();
    while let Some(hash) = queue.pop_front() {
        if let Some(message) = dag.lookup(&hash) {
            for parent in message.parents() {
                if cone.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
    }
    cone
}
