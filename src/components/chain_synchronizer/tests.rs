use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use super::*;
use crate::{
    testing,
    types::{BlockSummary, Timestamp},
};

struct TestDiscovery {
    peers: Vec<NodeId>,
}

#[async_trait]
impl NodeDiscovery for TestDiscovery {
    async fn recently_alive_peers(&self) -> Vec<NodeId> {
        self.peers.clone()
    }
}

/// How a test peer answers a slice request.
enum SliceBehavior {
    /// Serves its DAG honestly, filtered by the requested window.
    Window(Vec<BlockSummary>),
    /// Returns the given summaries as-is, ignoring the window.
    Raw(Vec<BlockSummary>),
    /// Never produces anything.
    Hang,
}

struct TestClient {
    peers: HashMap<NodeId, SliceBehavior>,
}

impl DagSliceClient for TestClient {
    fn stream_dag_slice(
        &self,
        peer: &NodeId,
        start_rank: u64,
        end_rank: u64,
    ) -> BoxStream<'static, Result<BlockSummary, SynchronizationError>> {
        match self.peers.get(peer) {
            Some(SliceBehavior::Window(summaries)) => {
                let items: Vec<_> = summaries
                    .iter()
                    .filter(|summary| {
                        summary.header.rank >= start_rank && summary.header.rank <= end_rank
                    })
                    .cloned()
                    .map(Ok)
                    .collect();
                stream::iter(items).boxed()
            }
            Some(SliceBehavior::Raw(summaries)) => {
                let items: Vec<_> = summaries.iter().cloned().map(Ok).collect();
                stream::iter(items).boxed()
            }
            Some(SliceBehavior::Hang) => stream::pending().boxed(),
            None => stream::iter(Vec::new()).boxed(),
        }
    }
}

#[derive(Debug, Default)]
struct CountingScheduler {
    downloaded: Mutex<Vec<BlockHash>>,
}

#[async_trait]
impl DownloadScheduler for CountingScheduler {
    async fn download_block(&self, summary: BlockSummary) -> Result<(), SynchronizationError> {
        self.downloaded.lock().unwrap().push(summary.block_hash);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FailingScheduler;

#[async_trait]
impl DownloadScheduler for FailingScheduler {
    async fn download_block(&self, summary: BlockSummary) -> Result<(), SynchronizationError> {
        Err(SynchronizationError::DownloadFailed {
            block_hash: summary.block_hash,
            reason: "disk full".to_string(),
        })
    }
}

/// One distinct summary per rank in `0..=max_rank`.
fn summaries_up_to(max_rank: u64) -> Vec<BlockSummary> {
    (0..=max_rank)
        .map(|rank| {
            let mut header = testing::basic_header();
            header.rank = rank;
            header.j_rank = rank;
            header.timestamp = Timestamp::from(rank);
            testing::unsigned_summary(header)
        })
        .collect()
}

fn synchronizer(
    config: Config,
    peers: Vec<(NodeId, SliceBehavior)>,
    scheduler: Arc<CountingScheduler>,
) -> InitialSynchronizer<TestDiscovery, TestClient, CountingScheduler> {
    let discovery = TestDiscovery {
        peers: peers.iter().map(|(peer, _)| peer.clone()).collect(),
    };
    let client = TestClient {
        peers: peers.into_iter().collect(),
    };
    InitialSynchronizer::new(config, Arc::new(discovery), Arc::new(client), scheduler)
}

#[tokio::test]
async fn identical_peers_complete_in_one_round() {
    let summaries = summaries_up_to(10);
    let scheduler = Arc::new(CountingScheduler::default());
    let sync = synchronizer(
        Config::default(),
        vec![
            (NodeId::from("alpha"), SliceBehavior::Window(summaries.clone())),
            (NodeId::from("beta"), SliceBehavior::Window(summaries)),
        ],
        Arc::clone(&scheduler),
    );

    let handle = sync.sync().await.expect("sync should complete");
    // Both peers served the same slice; every summary is scheduled exactly once.
    assert_eq!(handle.download_count(), 11);
    handle.wait().await.expect("downloads should succeed");
    assert_eq!(scheduler.downloaded.lock().unwrap().len(), 11);
}

#[tokio::test]
async fn out_of_window_summary_fails_the_peer_only() {
    let mut beyond = testing::basic_header();
    beyond.rank = 200;
    let scheduler = Arc::new(CountingScheduler::default());
    let sync = synchronizer(
        Config::default(),
        vec![
            (
                NodeId::from("liar"),
                SliceBehavior::Raw(vec![testing::unsigned_summary(beyond)]),
            ),
            (
                NodeId::from("honest"),
                SliceBehavior::Window(summaries_up_to(5)),
            ),
        ],
        Arc::clone(&scheduler),
    );

    let handle = sync.sync().await.expect("sync should complete via the honest peer");
    handle.wait().await.expect("downloads should succeed");
    assert_eq!(scheduler.downloaded.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn window_advances_until_a_peer_is_fully_synced() {
    let config = Config {
        step: 5,
        ..Config::default()
    };
    let scheduler = Arc::new(CountingScheduler::default());
    let sync = synchronizer(
        config,
        vec![(
            NodeId::from("alpha"),
            SliceBehavior::Window(summaries_up_to(12)),
        )],
        Arc::clone(&scheduler),
    );

    let handle = sync.sync().await.expect("sync should complete");
    // Three rounds ([0,5], [5,10], [10,15]); window-boundary summaries are not re-scheduled.
    assert_eq!(handle.download_count(), 13);
    handle.wait().await.expect("downloads should succeed");
}

#[tokio::test]
async fn failed_peers_are_excluded_and_exhaustion_is_an_error() {
    let mut beyond = testing::basic_header();
    beyond.rank = 200;
    let bad_summary = testing::unsigned_summary(beyond);
    let scheduler = Arc::new(CountingScheduler::default());
    let sync = synchronizer(
        Config::default(),
        vec![
            (
                NodeId::from("liar-one"),
                SliceBehavior::Raw(vec![bad_summary.clone()]),
            ),
            (
                NodeId::from("liar-two"),
                SliceBehavior::Raw(vec![bad_summary]),
            ),
        ],
        scheduler,
    );

    assert!(matches!(
        sync.sync().await.unwrap_err(),
        SynchronizationError::PeersExhausted {
            fully_synced: 0,
            min_successful: 1,
        }
    ));
}

#[tokio::test]
async fn duplicate_summaries_mark_the_peer_failed() {
    let duplicated = summaries_up_to(0).remove(0);
    let scheduler = Arc::new(CountingScheduler::default());
    let sync = synchronizer(
        Config::default(),
        vec![(
            NodeId::from("stutterer"),
            SliceBehavior::Raw(vec![duplicated.clone(), duplicated]),
        )],
        scheduler,
    );

    assert!(matches!(
        sync.sync().await.unwrap_err(),
        SynchronizationError::PeersExhausted { .. }
    ));
}

#[tokio::test]
async fn unresponsive_streams_time_out() {
    let config = Config {
        stream_timeout: crate::types::TimeDiff::from_millis(20),
        ..Config::default()
    };
    let scheduler = Arc::new(CountingScheduler::default());
    let sync = synchronizer(
        config,
        vec![(NodeId::from("mute"), SliceBehavior::Hang)],
        scheduler,
    );

    assert!(matches!(
        sync.sync().await.unwrap_err(),
        SynchronizationError::PeersExhausted { .. }
    ));
}

#[tokio::test]
async fn download_failures_surface_through_the_handle() {
    let discovery = TestDiscovery {
        peers: vec![NodeId::from("alpha")],
    };
    let client = TestClient {
        peers: vec![(
            NodeId::from("alpha"),
            SliceBehavior::Window(summaries_up_to(3)),
        )]
        .into_iter()
        .collect(),
    };
    let sync = InitialSynchronizer::new(
        Config::default(),
        Arc::new(discovery),
        Arc::new(client),
        Arc::new(FailingScheduler),
    );

    let handle = sync.sync().await.expect("sync itself should complete");
    assert!(matches!(
        handle.wait().await.unwrap_err(),
        SynchronizationError::DownloadFailed { .. }
    ));
}
