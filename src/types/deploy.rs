//! Deploys: the units of work blocks carry.

use std::fmt::{self, Debug, Display, Formatter};

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use super::{TimeDiff, Timestamp};
use crate::crypto::hash::{self, Digest};
#[cfg(test)]
use crate::testing::TestRng;

/// The cryptographic hash of a deploy.
#[derive(
    Copy, Clone, DataSize, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
pub struct DeployHash(Digest);

impl DeployHash {
    /// Constructs a new `DeployHash`.
    pub fn new(hash: Digest) -> Self {
        DeployHash(hash)
    }

    /// Returns the wrapped inner hash.
    pub fn inner(&self) -> &Digest {
        &self.0
    }

    /// Generates a random instance using a `TestRng`.
    #[cfg(test)]
    pub fn random(rng: &mut TestRng) -> Self {
        DeployHash(Digest::random(rng))
    }
}

impl Display for DeployHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "deploy-hash({})", self.0)
    }
}

impl Debug for DeployHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:?}", self.0)
    }
}

impl From<Digest> for DeployHash {
    fn from(digest: Digest) -> Self {
        DeployHash(digest)
    }
}

/// The header of a deploy; everything the deploy hash commits to.
#[derive(Clone, DataSize, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DeployHeader {
    /// The account submitting the deploy.
    pub account: Vec<u8>,
    /// Creation time of the deploy.
    pub timestamp: Timestamp,
    /// How long the deploy stays includable after `timestamp`.
    pub ttl: TimeDiff,
    /// Hashes of deploys that must already be present in the block's past.
    pub dependencies: Vec<Vec<u8>>,
    /// The chain the deploy is intended for; empty means any chain.
    pub chain_name: String,
    /// Hash of the deploy body.
    pub body_hash: Digest,
}

impl DeployHeader {
    /// Computes the deploy hash from the canonical encoding of this header.
    pub fn compute_hash(&self) -> DeployHash {
        DeployHash::new(hash::hash(
            &bincode::serialize(self).expect("serialize deploy header"),
        ))
    }
}

/// The body of a deploy: the payment and session code it executes.
#[derive(Clone, DataSize, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DeployBody {
    /// Payment code.
    pub payment: Vec<u8>,
    /// Session code.
    pub session: Vec<u8>,
}

impl DeployBody {
    /// Computes the body hash from the canonical encoding of this body.
    pub fn compute_hash(&self) -> Digest {
        hash::hash(&bincode::serialize(self).expect("serialize deploy body"))
    }
}

/// A signature over a deploy hash by one of its approvers.
#[derive(Clone, DataSize, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Approval {
    /// The public key of the signer.
    pub signer: Vec<u8>,
    /// The signature over the deploy hash.
    pub signature: Vec<u8>,
    /// The name of the signature algorithm.
    pub signature_algorithm: String,
}

/// A deploy: a unit of work submitted by a user, carried by blocks.
#[derive(Clone, DataSize, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Deploy {
    /// The claimed deploy hash.
    pub deploy_hash: DeployHash,
    /// The deploy header.
    pub header: DeployHeader,
    /// The deploy body.
    pub body: DeployBody,
    /// Signatures approving the deploy; at least one is required.
    pub approvals: Vec<Approval>,
}

impl Display for Deploy {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "deploy({}, {} approvals)",
            self.deploy_hash,
            self.approvals.len()
        )
    }
}
