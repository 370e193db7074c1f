//! Tip views over the DAG.
//!
//! Both views expose the same operation names so call sites state explicitly whether they work
//! era-scoped or globally. Only the era-scoped view can answer equivocation queries: a validator
//! with tips in two sibling eras is not an equivocator.

use std::collections::{BTreeSet, HashMap};

use crate::types::{BlockHash, Message, ValidatorId};

/// The latest messages within a single era.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EraTips {
    key_block_hash: BlockHash,
    latest: HashMap<ValidatorId, BTreeSet<Message>>,
}

impl EraTips {
    pub(super) fn new(
        key_block_hash: BlockHash,
        latest: HashMap<ValidatorId, BTreeSet<Message>>,
    ) -> Self {
        EraTips {
            key_block_hash,
            latest,
        }
    }

    /// Returns the key block identifying the era these tips belong to.
    pub fn key_block_hash(&self) -> &BlockHash {
        &self.key_block_hash
    }

    /// Returns the hashes of `validator_id`'s latest messages in this era.
    pub fn latest_message_hash(&self, validator_id: &ValidatorId) -> BTreeSet<BlockHash> {
        latest_message_hash(&self.latest, validator_id)
    }

    /// Returns `validator_id`'s latest messages in this era.
    pub fn latest_message(&self, validator_id: &ValidatorId) -> BTreeSet<Message> {
        latest_message(&self.latest, validator_id)
    }

    /// Returns all validators' latest message hashes in this era.
    pub fn latest_message_hashes(&self) -> HashMap<ValidatorId, BTreeSet<BlockHash>> {
        latest_message_hashes(&self.latest)
    }

    /// Returns all validators' latest messages in this era.
    pub fn latest_messages(&self) -> &HashMap<ValidatorId, BTreeSet<Message>> {
        &self.latest
    }

    /// Returns the validators with two or more latest messages in this era.
    pub fn equivocators(&self) -> BTreeSet<ValidatorId> {
        self.latest
            .iter()
            .filter(|(_, messages)| messages.len() >= 2)
            .map(|(validator_id, _)| validator_id.clone())
            .collect()
    }

    /// Returns the equivocating validators together with their latest messages.
    pub fn equivocations(&self) -> HashMap<ValidatorId, BTreeSet<Message>> {
        self.latest
            .iter()
            .filter(|(_, messages)| messages.len() >= 2)
            .map(|(validator_id, messages)| (validator_id.clone(), messages.clone()))
            .collect()
    }
}

/// The latest messages across all eras.
///
/// Must not be used to detect equivocation; a validator may have tips in several sibling eras
/// without being faulty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GlobalTips {
    latest: HashMap<ValidatorId, BTreeSet<Message>>,
}

impl GlobalTips {
    pub(super) fn new(latest: HashMap<ValidatorId, BTreeSet<Message>>) -> Self {
        GlobalTips { latest }
    }

    /// Returns the hashes of `validator_id`'s latest messages across all eras.
    pub fn latest_message_hash(&self, validator_id: &ValidatorId) -> BTreeSet<BlockHash> {
        latest_message_hash(&self.latest, validator_id)
    }

    /// Returns `validator_id`'s latest messages across all eras.
    pub fn latest_message(&self, validator_id: &ValidatorId) -> BTreeSet<Message> {
        latest_message(&self.latest, validator_id)
    }

    /// Returns all validators' latest message hashes across all eras.
    pub fn latest_message_hashes(&self) -> HashMap<ValidatorId, BTreeSet<BlockHash>> {
        latest_message_hashes(&self.latest)
    }

    /// Returns all validators' latest messages across all eras.
    pub fn latest_messages(&self) -> &HashMap<ValidatorId, BTreeSet<Message>> {
        &self.latest
    }
}

fn latest_message_hash(
    latest: &HashMap<ValidatorId, BTreeSet<Message>>,
    validator_id: &ValidatorId,
) -> BTreeSet<BlockHash> {
    latest
        .get(validator_id)
        .map(|messages| messages.iter().map(|message| *message.hash()).collect())
        .unwrap_or_default()
}

fn latest_message(
    latest: &HashMap<ValidatorId, BTreeSet<Message>>,
    validator_id: &ValidatorId,
) -> BTreeSet<Message> {
    latest.get(validator_id).cloned().unwrap_or_default()
}

fn latest_message_hashes(
    latest: &HashMap<ValidatorId, BTreeSet<Message>>,
) -> HashMap<ValidatorId, BTreeSet<BlockHash>> {
    latest
        .iter()
        .map(|(validator_id, messages)| {
            let hashes = messages.iter().map(|message| *message.hash()).collect();
            (validator_id.clone(), hashes)
        })
        .collect()
}
