//! Utilities for testing: a deterministic RNG, key material and block builders.

use ed25519_dalek::{ExpandedSecretKey, PublicKey, SecretKey};
use rand::{Rng, RngCore};
use rand_pcg::Pcg64Mcg;

use crate::{
    crypto::{asymmetric_key, hash},
    types::{
        BlockBody, BlockHash, BlockHeader, BlockSummary, Bond, Justification, Message,
        MessageType, ProtocolVersion, Timestamp, ValidatorId,
    },
};

/// The chain name used throughout the tests.
pub(crate) const TEST_CHAIN_NAME: &str = "casper-dag-test";

/// A deterministic RNG for tests. Prints its seed so failures can be reproduced.
pub(crate) struct TestRng(Pcg64Mcg);

impl TestRng {
    /// Creates a new RNG seeded from entropy, printing the seed.
    pub(crate) fn new() -> Self {
        let seed: u64 = rand::thread_rng().next_u64();
        println!("TestRng seed: {}", seed);
        Self::from_seed(seed)
    }

    /// Creates a new RNG from the given seed.
    pub(crate) fn from_seed(seed: u64) -> Self {
        use rand::SeedableRng;
        TestRng(Pcg64Mcg::seed_from_u64(seed))
    }
}

impl RngCore for TestRng {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.try_fill_bytes(dest)
    }
}

/// An Ed25519 test validator that can sign summaries and deploys.
pub(crate) struct TestValidator {
    secret: [u8; 32],
    public: Vec<u8>,
}

impl TestValidator {
    /// Generates a fresh validator key pair.
    pub(crate) fn random(rng: &mut TestRng) -> Self {
        let secret = rng.gen::<[u8; 32]>();
        let secret_key = SecretKey::from_bytes(&secret).expect("should create secret key");
        let public = PublicKey::from(&secret_key).to_bytes().to_vec();
        TestValidator { secret, public }
    }

    /// The validator's identity.
    pub(crate) fn id(&self) -> ValidatorId {
        ValidatorId::new(self.public.clone())
    }

    /// The validator's raw public key bytes.
    pub(crate) fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Signs `data` with the validator's secret key.
    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        let secret_key = SecretKey::from_bytes(&self.secret).expect("should create secret key");
        let public_key = PublicKey::from(&secret_key);
        ExpandedSecretKey::from(&secret_key)
            .sign(data, &public_key)
            .to_bytes()
            .to_vec()
    }

    /// A stake entry for this validator.
    pub(crate) fn bond(&self, stake: u64) -> Bond {
        Bond {
            validator_id: self.id(),
            stake,
        }
    }
}

/// Returns a header with empty body, no parents and test defaults; tests mutate fields directly.
pub(crate) fn basic_header() -> BlockHeader {
    BlockHeader {
        parent_hashes: vec![],
        justifications: vec![],
        validator_id: ValidatorId::default(),
        validator_prev_block_hash: None,
        validator_block_seq_num: 0,
        key_block_hash: BlockHash::default(),
        rank: 0,
        j_rank: 0,
        timestamp: Timestamp::zero(),
        body_hash: BlockBody::default().compute_hash(),
        pre_state_hash: hash::hash(b"pre-state"),
        post_state_hash: hash::hash(b"post-state"),
        bonds: vec![],
        deploy_count: 0,
        protocol_version: ProtocolVersion::V1_0_0,
        chain_name: TEST_CHAIN_NAME.to_string(),
        message_type: MessageType::Block,
    }
}

/// Returns a genesis-like summary carrying the given initial bonds.
pub(crate) fn genesis_summary(bonds: Vec<Bond>) -> BlockSummary {
    let mut header = basic_header();
    header.bonds = bonds;
    unsigned_summary(header)
}

/// Wraps `header` in a summary without signing it; the hash is computed from the header.
pub(crate) fn unsigned_summary(header: BlockHeader) -> BlockSummary {
    let block_hash = header.compute_hash();
    BlockSummary {
        block_hash,
        header,
        signature: vec![],
        signature_algorithm: String::new(),
    }
}

/// Stamps `header` with `validator`'s identity and wraps it in a signed summary.
pub(crate) fn signed_summary(mut header: BlockHeader, validator: &TestValidator) -> BlockSummary {
    header.validator_id = validator.id();
    let block_hash = header.compute_hash();
    let signature = validator.sign(block_hash.inner().as_ref());
    BlockSummary {
        block_hash,
        header,
        signature,
        signature_algorithm: asymmetric_key::ED25519.to_string(),
    }
}

/// Returns a header citing all of `cited` as both parents and justifications, with the rank
/// derived from them.
pub(crate) fn header_citing(
    cited: &[&BlockSummary],
    era: BlockHash,
    seq: u64,
    prev: Option<BlockHash>,
    timestamp_ms: u64,
) -> BlockHeader {
    let mut header = basic_header();
    header.parent_hashes = cited.iter().map(|summary| summary.block_hash).collect();
    header.justifications = cited
        .iter()
        .map(|summary| justification(summary.header.validator_id.clone(), summary.block_hash))
        .collect();
    header.key_block_hash = era;
    header.rank = cited
        .iter()
        .map(|summary| summary.header.rank)
        .max()
        .map_or(0, |rank| rank + 1);
    header.j_rank = header.rank;
    header.validator_block_seq_num = seq;
    header.validator_prev_block_hash = prev;
    header.timestamp = Timestamp::from(timestamp_ms);
    header
}

/// Shorthand for a justification entry.
pub(crate) fn justification(validator_id: ValidatorId, hash: BlockHash) -> Justification {
    Justification {
        validator_id,
        latest_block_hash: hash,
    }
}

/// Builds the message for a summary, panicking on malformed input.
pub(crate) fn message_from(summary: &BlockSummary) -> Message {
    Message::from_block_summary(summary).expect("should build message")
}
