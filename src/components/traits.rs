//! Interfaces to the node subsystems the DAG layer consumes.

use std::collections::BTreeSet;

use async_trait::async_trait;
use datasize::DataSize;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{chain_synchronizer::SynchronizationError, dag_store::DagRepresentation};
use crate::{
    crypto::hash::Digest,
    types::{
        Block, BlockHash, BlockSummary, Bond, DeployHash, Justification, NodeId, ProtocolVersion,
    },
};

/// Error raised by the persistent block store backing this layer.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BlockStorageError {
    /// Stored bytes fail their content hash. Fatal; surfaced to the operator.
    #[error("block storage is corrupt: {0}")]
    Corrupt(String),

    /// Any other store failure.
    #[error("block storage failure: {0}")]
    Other(String),
}

/// Read access to the node's persistent block store.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// Returns whether a block with the given hash is stored.
    async fn contains(&self, block_hash: &BlockHash) -> Result<bool, BlockStorageError>;

    /// Returns the stored block, if present.
    async fn get(&self, block_hash: &BlockHash) -> Result<Option<Block>, BlockStorageError>;

    /// Returns the hashes of all stored blocks that include the given deploy.
    async fn find_block_hashes_with_deploy_hash(
        &self,
        deploy_hash: &DeployHash,
    ) -> Result<BTreeSet<BlockHash>, BlockStorageError>;
}

/// The opaque, merged transform effects of executing a block's deploys.
#[derive(Clone, DataSize, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEffects(pub Vec<u8>);

/// Error raised by the execution engine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecutionEngineError {
    /// Committing the effects failed.
    #[error("commit failed: {0}")]
    Commit(String),
}

/// The outcome of committing a block's effects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitResult {
    /// The resulting global state hash.
    pub post_state_hash: Digest,
    /// The bonded validator set at the resulting state.
    pub bonded_validators: Vec<Bond>,
}

/// The execution engine computing post-states.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Commits `effects` on top of `pre_state_hash`, returning the resulting state root and
    /// bonded validator set.
    async fn commit(
        &self,
        pre_state_hash: Digest,
        effects: &ExecutionEffects,
        protocol_version: ProtocolVersion,
    ) -> Result<CommitResult, ExecutionEngineError>;
}

/// Node discovery, as consumed by the initial synchronizer.
#[async_trait]
pub trait NodeDiscovery: Send + Sync {
    /// Returns the peers recently seen alive.
    async fn recently_alive_peers(&self) -> Vec<NodeId>;
}

/// Streaming access to a peer's DAG slices.
pub trait DagSliceClient: Send + Sync {
    /// Requests the summaries of all blocks with ranks within `[start_rank, end_rank]` from
    /// `peer`. Dropping the stream cancels the request.
    fn stream_dag_slice(
        &self,
        peer: &NodeId,
        start_rank: u64,
        end_rank: u64,
    ) -> BoxStream<'static, Result<BlockSummary, SynchronizationError>>;
}

/// Schedules validated summaries for full download.
#[async_trait]
pub trait DownloadScheduler: Send + Sync + 'static {
    /// Downloads the full block for `summary`; resolves once the block is stored.
    async fn download_block(&self, summary: BlockSummary) -> Result<(), SynchronizationError>;
}

/// Fork choice over the DAG, as consulted by parent-canonicality validation.
pub trait ForkChoice: Send + Sync {
    /// Returns the expected parents, in order, for a block citing `justifications`.
    fn expected_parents(
        &self,
        dag: &DagRepresentation,
        justifications: &[Justification],
    ) -> Vec<BlockHash>;
}
