use datasize::DataSize;
use serde::{Deserialize, Serialize};

use crate::types::TimeDiff;

/// Configuration for initial DAG synchronization.
#[derive(Clone, DataSize, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Width of each rank window requested from peers.
    pub step: u64,
    /// The rank to start synchronizing from.
    pub rank_start_from: u64,
    /// How many peers must report fully synced before synchronization completes.
    pub min_successful: usize,
    /// Whether the initially selected peers are kept for all rounds, instead of re-selecting
    /// from the currently alive peers each round.
    pub memoize_nodes: bool,
    /// Whether peers that failed a round are excluded from later rounds.
    pub skip_failed_nodes_in_next_rounds: bool,
    /// How long to wait for each summary while reading a peer's stream.
    pub stream_timeout: TimeDiff,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            step: 100,
            rank_start_from: 0,
            min_successful: 1,
            memoize_nodes: false,
            skip_failed_nodes_in_next_rounds: true,
            stream_timeout: TimeDiff::from_seconds(5),
        }
    }
}
