//! Append-only storage for the block DAG.
//!
//! Messages are inserted only after validation and never change afterwards. A single write lock
//! makes each insert atomic across every index: the children index, the justification reverse
//! lookup, the per-era latest messages and the topological rank index.
//!
//! The latest messages of a validator within an era are the messages by that validator that are
//! not transitively cited by any other message by the same validator in the same era. A validator
//! with two or more of them has equivocated in that era; the smallest rank among a validator's
//! equivocating messages is memoized so the validation swimlane check does not re-scan the DAG.

pub(crate) mod tips;


use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    sync::{Arc, RwLock, RwLockReadGuard},
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{trace, warn};

use crate::types::{BlockHash, BlockInfo, Message, ValidatorId};
pub use tips::{EraTips, GlobalTips};

/// Error from DAG storage operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DagStorageError {
    /// A parent, justification or era key block of the message is not stored yet.
    #[error("dependency {missing} of message {block_hash} is missing from the DAG")]
    MissingDependency {
        /// The message that could not be inserted.
        block_hash: BlockHash,
        /// The absent dependency.
        missing: BlockHash,
    },

    /// Stored data contradicts its content hash. Fatal; surfaced to the operator.
    #[error("DAG storage is corrupt: {0}")]
    Corrupt(String),
}

/// Append-only store of DAG messages.
#[async_trait]
pub trait DagStorage: Send + Sync {
    /// Atomically inserts `message`, updating all indices. The message's parents, justifications
    /// and era key block must already be stored. Re-inserting an identical message is a no-op.
    async fn insert(&self, message: Message) -> Result<DagRepresentation, DagStorageError>;

    /// Returns a handle answering queries against an internally consistent view.
    async fn get_representation(&self) -> DagRepresentation;

    /// Durability barrier: once this returns, all prior successful inserts survive a restart.
    async fn checkpoint(&self) -> Result<(), DagStorageError>;

    /// Removes all stored state. Test-only.
    async fn clear(&self) -> Result<(), DagStorageError>;
}

/// In-memory implementation of [`DagStorage`](trait.DagStorage.html).
#[derive(Debug, Default)]
pub struct InMemDagStorage {
    state: Arc<RwLock<DagState>>,
}

impl InMemDagStorage {
    /// Creates a new, empty in-memory DAG store.
    pub fn new() -> Self {
        InMemDagStorage::default()
    }

    fn representation(&self) -> DagRepresentation {
        DagRepresentation {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl DagStorage for InMemDagStorage {
    async fn insert(&self, message: Message) -> Result<DagRepresentation, DagStorageError> {
        self.state
            .write()
            .expect("DAG state lock poisoned")
            .insert(message)?;
        Ok(self.representation())
    }

    async fn get_representation(&self) -> DagRepresentation {
        self.representation()
    }

    async fn checkpoint(&self) -> Result<(), DagStorageError> {
        trace!("checkpoint requested; in-memory storage has nothing to flush");
        Ok(())
    }

    async fn clear(&self) -> Result<(), DagStorageError> {
        *self.state.write().expect("DAG state lock poisoned") = DagState::default();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DagState {
    /// All stored messages, by hash.
    messages: HashMap<BlockHash, Message>,
    /// Direct children, by parent hash.
    children: HashMap<BlockHash, BTreeSet<BlockHash>>,
    /// Messages naming a hash in their justifications, by cited hash.
    justification_usages: HashMap<BlockHash, BTreeSet<BlockHash>>,
    /// Per-era latest messages: era key block -> validator -> latest message hashes.
    era_latest_messages: HashMap<BlockHash, HashMap<ValidatorId, BTreeSet<BlockHash>>>,
    /// All stored message hashes, by rank.
    rank_index: BTreeMap<u64, BTreeSet<BlockHash>>,
    /// The smallest rank among each known equivocator's equivocating messages.
    equivocation_base_ranks: HashMap<ValidatorId, u64>,
}

impl DagState {
    fn insert(&mut self, message: Message) -> Result<(), DagStorageError> {
        let block_hash = *message.hash();
        if let Some(existing) = self.messages.get(&block_hash) {
            if *existing == message {
                trace!(%block_hash, "message already stored; ignoring repeated insert");
                return Ok(());
            }
            return Err(DagStorageError::Corrupt(format!(
                "two distinct messages stored under hash {}",
                block_hash
            )));
        }
        if !message.is_genesis_like() {
            for dependency in message.parents_and_justifications() {
                if !self.messages.contains_key(dependency) {
                    return Err(DagStorageError::MissingDependency {
                        block_hash,
                        missing: *dependency,
                    });
                }
            }
            let key_block_hash = *message.key_block_hash();
            if !self.messages.contains_key(&key_block_hash) {
                return Err(DagStorageError::MissingDependency {
                    block_hash,
                    missing: key_block_hash,
                });
            }
        }

        for parent in message.parents() {
            self.children.entry(*parent).or_default().insert(block_hash);
        }
        for cited in message.justification_hashes() {
            self.justification_usages
                .entry(*cited)
                .or_default()
                .insert(block_hash);
        }
        self.rank_index
            .entry(message.rank())
            .or_default()
            .insert(block_hash);
        if !message.is_genesis_like() {
            self.update_latest_messages(&message);
        }
        self.messages.insert(block_hash, message);
        Ok(())
    }

    /// Updates the creator's latest messages in the message's era: every current latest message
    /// transitively cited by the new one is superseded, then the new message is added.
    fn update_latest_messages(&mut self, message: &Message) {
        let era = *message.key_block_hash();
        let validator_id = message.validator_id().clone();
        let current: BTreeSet<BlockHash> = self
            .era_latest_messages
            .get(&era)
            .and_then(|validators| validators.get(&validator_id))
            .cloned()
            .unwrap_or_default();
        let superseded: Vec<BlockHash> = current
            .iter()
            .filter(|hash| self.cites_transitively(message, hash, &era))
            .cloned()
            .collect();

        let latest = self
            .era_latest_messages
            .entry(era)
            .or_default()
            .entry(validator_id.clone())
            .or_default();
        for hash in superseded {
            latest.remove(&hash);
        }
        latest.insert(*message.hash());
        if latest.len() < 2 {
            return;
        }
        let tips: Vec<BlockHash> = latest.iter().cloned().collect();

        warn!(validator = %validator_id, era = %era, "validator equivocated in era");
        let mut base_rank = message.rank();
        for hash in &tips {
            if let Some(stored) = self.messages.get(hash) {
                base_rank = base_rank.min(stored.rank());
            }
        }
        let entry = self
            .equivocation_base_ranks
            .entry(validator_id)
            .or_insert(base_rank);
        if base_rank < *entry {
            *entry = base_rank;
        }
    }

    /// Returns whether `target` is within `from`'s transitive justifications, traversing only
    /// messages belonging to `era`.
    fn cites_transitively(&self, from: &Message, target: &BlockHash, era: &BlockHash) -> bool {
        let mut queue: VecDeque<BlockHash> = from.justification_hashes().cloned().collect();
        let mut visited: HashSet<BlockHash> = queue.iter().cloned().collect();
        while let Some(hash) = queue.pop_front() {
            if hash == *target {
                return true;
            }
            if let Some(message) = self.messages.get(&hash) {
                if message.key_block_hash() != era {
                    continue;
                }
                for cited in message.justification_hashes() {
                    if visited.insert(*cited) {
                        queue.push_back(*cited);
                    }
                }
            }
        }
        false
    }
}

/// A queryable view of the DAG.
///
/// The view is not a frozen snapshot; concurrent inserts may become visible between queries, but
/// every single query observes an internally consistent state.
#[derive(Clone, Debug)]
pub struct DagRepresentation {
    state: Arc<RwLock<DagState>>,
}

impl DagRepresentation {
    fn read(&self) -> RwLockReadGuard<DagState> {
        self.state.read().expect("DAG state lock poisoned")
    }

    /// Returns the message stored under `block_hash`, if any.
    pub fn lookup(&self, block_hash: &BlockHash) -> Option<Message> {
        self.read().messages.get(block_hash).cloned()
    }

    /// Returns whether a message with the given hash is stored.
    pub fn contains(&self, block_hash: &BlockHash) -> bool {
        self.read().messages.contains_key(block_hash)
    }

    /// Returns the direct children of `block_hash`: the messages listing it among their parents.
    pub fn children(&self, block_hash: &BlockHash) -> Vec<BlockHash> {
        self.read()
            .children
            .get(block_hash)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every message naming `block_hash` in its justifications.
    pub fn justification_to_blocks(&self, block_hash: &BlockHash) -> Vec<BlockHash> {
        self.read()
            .justification_usages
            .get(block_hash)
            .map(|usages| usages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the latest messages across all eras.
    ///
    /// A validator may legitimately have tips in several sibling eras, so this view must never
    /// be used to detect equivocation; use
    /// [`latest_in_era`](#method.latest_in_era) for that. Restricting the union to the *active*
    /// eras is the consumer's business: the storage treats all eras as active.
    pub fn latest_global(&self) -> GlobalTips {
        let state = self.read();
        let mut latest: HashMap<ValidatorId, BTreeSet<Message>> = HashMap::new();
        for validators in state.era_latest_messages.values() {
            for (validator_id, hashes) in validators {
                let entry = latest.entry(validator_id.clone()).or_default();
                for hash in hashes {
                    if let Some(message) = state.messages.get(hash) {
                        entry.insert(message.clone());
                    }
                }
            }
        }
        GlobalTips::new(latest)
    }

    /// Returns the latest messages within the era identified by `key_block_hash`; the only
    /// correct basis for equivocation detection.
    pub fn latest_in_era(&self, key_block_hash: &BlockHash) -> EraTips {
        let state = self.read();
        let latest = state
            .era_latest_messages
            .get(key_block_hash)
            .map(|validators| {
                validators
                    .iter()
                    .map(|(validator_id, hashes)| {
                        let messages = hashes
                            .iter()
                            .filter_map(|hash| state.messages.get(hash).cloned())
                            .collect();
                        (validator_id.clone(), messages)
                    })
                    .collect()
            })
            .unwrap_or_default();
        EraTips::new(*key_block_hash, latest)
    }

    /// Returns all latest messages grouped by era, for behavior classification.
    pub fn latest_messages_by_era(
        &self,
    ) -> HashMap<BlockHash, HashMap<ValidatorId, BTreeSet<Message>>> {
        let state = self.read();
        state
            .era_latest_messages
            .iter()
            .map(|(key_block_hash, validators)| {
                let validators = validators
                    .iter()
                    .map(|(validator_id, hashes)| {
                        let messages = hashes
                            .iter()
                            .filter_map(|hash| state.messages.get(hash).cloned())
                            .collect();
                        (validator_id.clone(), messages)
                    })
                    .collect();
                (*key_block_hash, validators)
            })
            .collect()
    }

    /// Returns the smallest rank among `validator_id`'s known equivocating messages, if the
    /// validator has been observed equivocating in any era.
    pub fn equivocation_base_rank(&self, validator_id: &ValidatorId) -> Option<u64> {
        self.read()
            .equivocation_base_ranks
            .get(validator_id)
            .copied()
    }

    /// Returns whether `validator_id` has been observed equivocating in any era.
    pub fn is_equivocator(&self, validator_id: &ValidatorId) -> bool {
        self.equivocation_base_rank(validator_id).is_some()
    }

    /// Lazily enumerates stored messages one rank at a time, ascending, both bounds inclusive.
    pub fn topo_sort(&self, start_rank: u64, end_rank: u64) -> TopoSortIter {
        TopoSortIter {
            state: Arc::clone(&self.state),
            next_rank: start_rank,
            end_rank,
        }
    }

    /// Enumerates the top `k` ranks of the DAG.
    pub fn topo_sort_tail(&self, k: u64) -> TopoSortIter {
        let max_rank = {
            let state = self.read();
            state.rank_index.keys().next_back().copied()
        };
        match max_rank {
            Some(max_rank) => self.topo_sort((max_rank + 1).saturating_sub(k), max_rank),
            None => self.topo_sort(1, 0),
        }
    }
}

/// Lazy rank-by-rank enumeration of stored messages.
///
/// Each call to `next` reads a single rank group; nothing beyond it is materialized. The
/// iteration is finite and not restartable.
#[derive(Debug)]
pub struct TopoSortIter {
    state: Arc<RwLock<DagState>>,
    next_rank: u64,
    end_rank: u64,
}

impl Iterator for TopoSortIter {
    type Item = Vec<BlockInfo>;

    fn next(&mut self) -> Option<Vec<BlockInfo>> {
        if self.next_rank > self.end_rank {
            return None;
        }
        let rank = self.next_rank;
        let state = self.state.read().expect("DAG state lock poisoned");
        // Ranks are dense: a message of rank `r + 1` requires a stored dependency of rank `r`,
        // so the first absent rank marks the top of the DAG.
        let hashes = state.rank_index.get(&rank)?;
        let infos = hashes
            .iter()
            .filter_map(|hash| {
                state.messages.get(hash).map(|message| BlockInfo {
                    block_hash: *hash,
                    validator_id: message.validator_id().clone(),
                    rank,
                })
            })
            .collect();
        self.next_rank += 1;
        Some(infos)
    }
}
