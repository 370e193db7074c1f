//! # Casper block DAG
//!
//! This crate contains the block DAG layer of a Casper node: append-only
//! storage of consensus messages as vertices of a directed acyclic graph,
//! per-era tip tracking and equivocation detection, the block validation
//! pipeline, and initial DAG synchronization against peers.
//!
//! The layer does not persist raw blocks, verify chain finality or talk to
//! the network directly; those collaborators are consumed through the traits
//! in [`components::traits`](components/traits/index.html).

#![doc(html_root_url = "https://docs.rs/casper-dag/1.0.0")]
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications
)]

pub mod components;
pub mod crypto;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod utils;

pub use components::{
    block_validator::{BlockValidator, InvalidBlock},
    chain_synchronizer::{
        Config as SynchronizerConfig, InitialSynchronizer, SyncHandle, SynchronizationError,
    },
    dag_store::{
        DagRepresentation, DagStorage, DagStorageError, EraTips, GlobalTips, InMemDagStorage,
    },
    observed_behavior::{EraObservedBehavior, ObservedValidatorBehavior},
};
