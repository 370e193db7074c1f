//! Classification of observed validator behavior, per era.
//!
//! The classifier collapses the per-era latest-message sets maintained by the DAG store into a
//! three-way verdict per `(era, validator)` pair. Two equivocating messages are all the evidence
//! ever needed, so `Equivocated` deliberately stores exactly two witnesses; when more exist, the
//! two smallest by hash are picked so that every node derives the same pair.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{BlockHash, ValidatorId};

/// The observed behavior of a single validator within one era.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ObservedValidatorBehavior<T> {
    /// No message by the validator was observed in the era.
    Empty,
    /// The validator's single latest message.
    Honest(T),
    /// Two witnesses of the validator equivocating.
    Equivocated(T, T),
}

impl<T> ObservedValidatorBehavior<T> {
    /// Returns the latest message, if the validator is honest.
    pub fn correct(&self) -> Option<&T> {
        match self {
            ObservedValidatorBehavior::Honest(message) => Some(message),
            ObservedValidatorBehavior::Empty | ObservedValidatorBehavior::Equivocated(..) => None,
        }
    }

    /// Returns whether the validator was observed equivocating.
    pub fn is_equivocated(&self) -> bool {
        matches!(self, ObservedValidatorBehavior::Equivocated(..))
    }

    /// Returns whether no message was observed.
    pub fn is_empty(&self) -> bool {
        matches!(self, ObservedValidatorBehavior::Empty)
    }
}

/// Observed behavior of all validators, by era.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EraObservedBehavior<T> {
    inner: HashMap<BlockHash, HashMap<ValidatorId, ObservedValidatorBehavior<T>>>,
}

impl<T: Clone + Ord> EraObservedBehavior<T> {
    /// Classifies the given per-era latest messages by cardinality: zero observed messages map
    /// to `Empty`, exactly one to `Honest` and two or more to `Equivocated` with the two
    /// smallest witnesses.
    pub fn from_latest_messages(
        latest: HashMap<BlockHash, HashMap<ValidatorId, BTreeSet<T>>>,
    ) -> Self {
        let inner = latest
            .into_iter()
            .map(|(key_block_hash, validators)| {
                let classified = validators
                    .into_iter()
                    .map(|(validator_id, messages)| {
                        let mut messages = messages.into_iter();
                        let behavior = match (messages.next(), messages.next()) {
                            (None, _) => ObservedValidatorBehavior::Empty,
                            (Some(message), None) => ObservedValidatorBehavior::Honest(message),
                            (Some(first), Some(second)) => {
                                ObservedValidatorBehavior::Equivocated(first, second)
                            }
                        };
                        (validator_id, behavior)
                    })
                    .collect();
                (key_block_hash, classified)
            })
            .collect();
        EraObservedBehavior { inner }
    }

    /// Returns the latest messages observed in the given era: one per honest validator, the two
    /// witnesses per equivocator.
    pub fn latest_messages_in_era(
        &self,
        key_block_hash: &BlockHash,
    ) -> HashMap<ValidatorId, BTreeSet<T>> {
        self.inner
            .get(key_block_hash)
            .map(|validators| {
                validators
                    .iter()
                    .filter_map(|(validator_id, behavior)| {
                        let messages: BTreeSet<T> = match behavior {
                            ObservedValidatorBehavior::Empty => return None,
                            ObservedValidatorBehavior::Honest(message) => {
                                Some(message.clone()).into_iter().collect()
                            }
                            ObservedValidatorBehavior::Equivocated(first, second) => {
                                vec![first.clone(), second.clone()].into_iter().collect()
                            }
                        };
                        Some((validator_id.clone(), messages))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl<T> EraObservedBehavior<T> {
    /// Returns the eras this instance has observations for.
    pub fn key_block_hashes(&self) -> impl Iterator<Item = &BlockHash> {
        self.inner.keys()
    }

    /// Returns the validators observed in the given era.
    pub fn validators_in_era(&self, key_block_hash: &BlockHash) -> HashSet<&ValidatorId> {
        self.inner
            .get(key_block_hash)
            .map(|validators| validators.keys().collect())
            .unwrap_or_default()
    }

    /// Returns the observed behavior of `validator_id` in the given era.
    pub fn get(
        &self,
        key_block_hash: &BlockHash,
        validator_id: &ValidatorId,
    ) -> Option<&ObservedValidatorBehavior<T>> {
        self.inner.get(key_block_hash)?.get(validator_id)
    }

    /// Returns every validator observed equivocating in any of the requested eras.
    pub fn equivocators_visible_in_eras(
        &self,
        key_block_hashes: &BTreeSet<BlockHash>,
    ) -> HashSet<ValidatorId> {
        key_block_hashes
            .iter()
            .filter_map(|key_block_hash| self.inner.get(key_block_hash))
            .flat_map(|validators| {
                validators
                    .iter()
                    .filter(|(_, behavior)| behavior.is_equivocated())
                    .map(|(validator_id, _)| validator_id.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRng;

    fn era_with(
        rng: &mut TestRng,
        observations: Vec<(ValidatorId, Vec<u32>)>,
    ) -> (
        BlockHash,
        HashMap<ValidatorId, BTreeSet<u32>>,
    ) {
        let key_block_hash = BlockHash::random(rng);
        let validators = observations
            .into_iter()
            .map(|(validator_id, messages)| (validator_id, messages.into_iter().collect()))
            .collect();
        (key_block_hash, validators)
    }

    #[test]
    fn classify_by_cardinality() {
        let mut rng = TestRng::new();
        let empty = ValidatorId::random(&mut rng);
        let honest = ValidatorId::random(&mut rng);
        let equivocator = ValidatorId::random(&mut rng);

        let (era, validators) = era_with(
            &mut rng,
            vec![
                (empty.clone(), vec![]),
                (honest.clone(), vec![7]),
                (equivocator.clone(), vec![5, 3, 9]),
            ],
        );
        let mut latest = HashMap::new();
        latest.insert(era, validators);
        let behavior = EraObservedBehavior::from_latest_messages(latest);

        assert_eq!(
            behavior.get(&era, &empty),
            Some(&ObservedValidatorBehavior::Empty)
        );
        assert_eq!(
            behavior.get(&era, &honest),
            Some(&ObservedValidatorBehavior::Honest(7))
        );
        // The two smallest witnesses are picked deterministically.
        assert_eq!(
            behavior.get(&era, &equivocator),
            Some(&ObservedValidatorBehavior::Equivocated(3, 5))
        );
    }

    #[test]
    fn equivocators_are_unioned_across_requested_eras() {
        let mut rng = TestRng::new();
        let alice = ValidatorId::random(&mut rng);
        let bob = ValidatorId::random(&mut rng);

        let (era_alpha, alpha_validators) = era_with(
            &mut rng,
            vec![(alice.clone(), vec![1, 2]), (bob.clone(), vec![4])],
        );
        let (era_beta, beta_validators) =
            era_with(&mut rng, vec![(bob.clone(), vec![5, 6])]);
        let mut latest = HashMap::new();
        latest.insert(era_alpha, alpha_validators);
        latest.insert(era_beta, beta_validators);
        let behavior = EraObservedBehavior::from_latest_messages(latest);

        let only_alpha: BTreeSet<BlockHash> = vec![era_alpha].into_iter().collect();
        let both: BTreeSet<BlockHash> = vec![era_alpha, era_beta].into_iter().collect();

        let alpha_equivocators = behavior.equivocators_visible_in_eras(&only_alpha);
        assert!(alpha_equivocators.contains(&alice));
        assert!(!alpha_equivocators.contains(&bob));

        let all_equivocators = behavior.equivocators_visible_in_eras(&both);
        assert!(all_equivocators.contains(&alice));
        assert!(all_equivocators.contains(&bob));
    }

    #[test]
    fn latest_messages_restore_witness_sets() {
        let mut rng = TestRng::new();
        let honest = ValidatorId::random(&mut rng);
        let equivocator = ValidatorId::random(&mut rng);

        let (era, validators) = era_with(
            &mut rng,
            vec![
                (honest.clone(), vec![1]),
                (equivocator.clone(), vec![2, 8]),
            ],
        );
        let mut latest = HashMap::new();
        latest.insert(era, validators);
        let behavior = EraObservedBehavior::from_latest_messages(latest);

        let messages = behavior.latest_messages_in_era(&era);
        assert_eq!(messages[&honest].len(), 1);
        assert_eq!(messages[&equivocator].len(), 2);
        assert!(behavior
            .latest_messages_in_era(&BlockHash::random(&mut rng))
            .is_empty());
    }
}
