//! Initial DAG synchronization.
//!
//! The synchronizer pulls header summaries in rank windows of width `step`, fanning out to every
//! candidate peer in parallel. A peer is *fully synced* for a round if its stream ends without
//! producing any summary at the top of the window, i.e. the peer's DAG ends inside it. Once
//! `min_successful` peers report fully synced the loop stops; otherwise the window advances to
//! the highest rank observed and the next round starts, with failed peers retried or excluded
//! per configuration.
//!
//! Every summary received is scheduled for download exactly once; dependencies are validated
//! downstream, after download. The returned [`SyncHandle`](struct.SyncHandle.html) completes
//! when all scheduled downloads have finished, and aborting it propagates to them.

mod config;
mod error;

#[cfg(test)]
mod tests;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::{task::JoinHandle, time::timeout};
use tracing::{info, trace, warn};

use super::traits::{DagSliceClient, DownloadScheduler, NodeDiscovery};
use crate::types::{BlockHash, NodeId};

pub use config::Config;
pub use error::SynchronizationError;

/// The outcome of one peer's round.
struct PeerRound {
    /// The highest rank the peer produced, if any.
    max_rank: Option<u64>,
    /// Whether the peer's stream ended below the top of the window.
    fully_synced: bool,
}

/// Completes when every download scheduled during synchronization has finished.
#[derive(Debug)]
pub struct SyncHandle {
    downloads: Vec<JoinHandle<Result<(), SynchronizationError>>>,
}

impl SyncHandle {
    /// Waits for all scheduled downloads; the first failure is returned.
    pub async fn wait(self) -> Result<(), SynchronizationError> {
        for download in self.downloads {
            download.await??;
        }
        Ok(())
    }

    /// Returns the number of downloads that were scheduled.
    pub fn download_count(&self) -> usize {
        self.downloads.len()
    }

    /// Aborts all still-running downloads.
    pub fn abort(&self) {
        for download in &self.downloads {
            download.abort();
        }
    }
}

/// Pulls DAG slices from peers until enough of them report fully synced.
#[derive(Debug)]
pub struct InitialSynchronizer<D, C, S> {
    config: Config,
    discovery: Arc<D>,
    client: Arc<C>,
    scheduler: Arc<S>,
}

impl<D, C, S> InitialSynchronizer<D, C, S>
where
    D: NodeDiscovery,
    C: DagSliceClient,
    S: DownloadScheduler,
{
    /// Creates a new synchronizer.
    pub fn new(config: Config, discovery: Arc<D>, client: Arc<C>, scheduler: Arc<S>) -> Self {
        InitialSynchronizer {
            config,
            discovery,
            client,
            scheduler,
        }
    }

    /// Runs initial synchronization; see the module docs for the loop's shape.
    ///
    /// Dropping the returned future cancels all in-flight peer streams; downloads already
    /// scheduled keep running and can be aborted through the returned handle.
    pub async fn sync(&self) -> Result<SyncHandle, SynchronizationError> {
        let mut start_rank = self.config.rank_start_from;
        let mut candidates: Vec<NodeId> = self.discovery.recently_alive_peers().await;
        let scheduled: Mutex<HashSet<BlockHash>> = Mutex::new(HashSet::new());
        let downloads: Mutex<Vec<JoinHandle<Result<(), SynchronizationError>>>> =
            Mutex::new(Vec::new());
        let mut fully_synced = 0;
        let mut round: u64 = 0;

        loop {
            if candidates.is_empty() {
                return Err(SynchronizationError::PeersExhausted {
                    fully_synced,
                    min_successful: self.config.min_successful,
                });
            }
            round += 1;
            let end_rank = start_rank + self.config.step;
            info!(
                round,
                start_rank,
                end_rank,
                peers = candidates.len(),
                "requesting DAG slice"
            );

            let results: Vec<(NodeId, Result<PeerRound, SynchronizationError>)> = {
                let mut requests: FuturesUnordered<_> = candidates
                    .iter()
                    .map(|peer| {
                        let peer = peer.clone();
                        let scheduled = &scheduled;
                        let downloads = &downloads;
                        async move {
                            let outcome = self
                                .pull_slice(&peer, start_rank, end_rank, scheduled, downloads)
                                .await;
                            (peer, outcome)
                        }
                    })
                    .collect();
                let mut results = Vec::new();
                while let Some(result) = requests.next().await {
                    results.push(result);
                }
                results
            };

            fully_synced = results
                .iter()
                .filter(|(_, outcome)| matches!(outcome, Ok(round) if round.fully_synced))
                .count();
            if fully_synced >= self.config.min_successful {
                info!(round, fully_synced, "initial DAG synchronization complete");
                return Ok(SyncHandle {
                    downloads: downloads
                        .into_inner()
                        .expect("download list lock poisoned"),
                });
            }

            let max_rank = results
                .iter()
                .filter_map(|(_, outcome)| outcome.as_ref().ok().and_then(|round| round.max_rank))
                .max();
            let failed: HashSet<NodeId> = results
                .iter()
                .filter(|(_, outcome)| outcome.is_err())
                .map(|(peer, _)| peer.clone())
                .collect();
            for (peer, outcome) in &results {
                if let Err(error) = outcome {
                    warn!(%peer, %error, "peer failed during initial synchronization");
                }
            }

            candidates = if self.config.memoize_nodes {
                candidates
            } else {
                self.discovery.recently_alive_peers().await
            };
            if self.config.skip_failed_nodes_in_next_rounds {
                candidates.retain(|peer| !failed.contains(peer));
            }
            if let Some(max_rank) = max_rank {
                if max_rank > start_rank {
                    start_rank = max_rank;
                }
            }
        }
    }

    /// Streams one window from one peer, scheduling fresh summaries for download.
    async fn pull_slice(
        &self,
        peer: &NodeId,
        start_rank: u64,
        end_rank: u64,
        scheduled: &Mutex<HashSet<BlockHash>>,
        downloads: &Mutex<Vec<JoinHandle<Result<(), SynchronizationError>>>>,
    ) -> Result<PeerRound, SynchronizationError> {
        let mut stream = self.client.stream_dag_slice(peer, start_rank, end_rank);
        let mut seen: HashSet<BlockHash> = HashSet::new();
        let mut max_rank: Option<u64> = None;
        let deadline = Duration::from(self.config.stream_timeout);

        loop {
            let summary = match timeout(deadline, stream.next()).await {
                Err(_) => {
                    return Err(SynchronizationError::StreamTimeout { peer: peer.clone() });
                }
                Ok(None) => break,
                Ok(Some(Err(error))) => return Err(error),
                Ok(Some(Ok(summary))) => summary,
            };
            let block_hash = summary.block_hash;
            let rank = summary.header.rank;
            if rank < start_rank || rank > end_rank {
                return Err(SynchronizationError::UnexpectedRank {
                    peer: peer.clone(),
                    block_hash,
                    rank,
                    start_rank,
                    end_rank,
                });
            }
            if !seen.insert(block_hash) {
                return Err(SynchronizationError::DuplicateSummary {
                    peer: peer.clone(),
                    block_hash,
                });
            }
            max_rank = Some(max_rank.map_or(rank, |max| max.max(rank)));

            let fresh = scheduled
                .lock()
                .expect("scheduled set lock poisoned")
                .insert(block_hash);
            if fresh {
                let scheduler = Arc::clone(&self.scheduler);
                let download =
                    tokio::spawn(async move { scheduler.download_block(summary).await });
                downloads
                    .lock()
                    .expect("download list lock poisoned")
                    .push(download);
            } else {
                trace!(%block_hash, "summary already scheduled for download");
            }
        }

        // A stream that never reached the top of the window means this peer has nothing beyond
        // it: the peer is fully synced for this round.
        let fully_synced = max_rank.map_or(true, |max| max < end_rank);
        Ok(PeerRound {
            max_rank,
            fully_synced,
        })
    }
}
