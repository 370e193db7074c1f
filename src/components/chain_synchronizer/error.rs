use thiserror::Error;
use tokio::task::JoinError;

use crate::types::{BlockHash, NodeId};

/// Error raised during initial DAG synchronization.
#[derive(Debug, Error)]
pub enum SynchronizationError {
    /// A peer returned a summary outside the requested rank window.
    #[error(
        "peer {peer} returned {block_hash} with rank {rank} outside the window \
         [{start_rank}, {end_rank}]"
    )]
    UnexpectedRank {
        /// The offending peer.
        peer: NodeId,
        /// The out-of-window summary.
        block_hash: BlockHash,
        /// The summary's rank.
        rank: u64,
        /// The window's lower bound.
        start_rank: u64,
        /// The window's upper bound.
        end_rank: u64,
    },

    /// A peer returned the same summary twice within one window.
    #[error("peer {peer} returned duplicate summary {block_hash} within one window")]
    DuplicateSummary {
        /// The offending peer.
        peer: NodeId,
        /// The repeated summary.
        block_hash: BlockHash,
    },

    /// Reading the next summary from a peer's stream timed out.
    #[error("timed out waiting for a summary from peer {peer}")]
    StreamTimeout {
        /// The unresponsive peer.
        peer: NodeId,
    },

    /// The peer failed its stream with an error of its own.
    #[error("peer {peer} stream failed: {reason}")]
    Stream {
        /// The failing peer.
        peer: NodeId,
        /// Human-readable description of the failure.
        reason: String,
    },

    /// The candidate list ran out before enough peers were fully synced.
    #[error(
        "no candidate peers left; {fully_synced} of {min_successful} required peers fully synced"
    )]
    PeersExhausted {
        /// Peers fully synced in the last round.
        fully_synced: usize,
        /// Peers required for completion.
        min_successful: usize,
    },

    /// A scheduled download failed.
    #[error("download of {block_hash} failed: {reason}")]
    DownloadFailed {
        /// The block that could not be downloaded.
        block_hash: BlockHash,
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A download task panicked or was aborted.
    #[error(transparent)]
    Join(#[from] JoinError),
}
