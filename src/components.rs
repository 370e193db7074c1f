//! Components of the block DAG layer.
//!
//! Data flows from the network inward: the [chain synchronizer](chain_synchronizer/index.html)
//! pulls block summaries from peers, the [block validator](block_validator/index.html) checks
//! them against the DAG, and accepted messages land in the
//! [DAG store](dag_store/index.html). Tip consumers read back through the store's
//! representation, with the [observed behavior classifier](observed_behavior/index.html)
//! collapsing per-era tips into honesty verdicts.
//!
//! Everything the layer consumes from the rest of the node is declared in
//! [`traits`](traits/index.html).

pub mod block_validator;
pub mod chain_synchronizer;
pub mod dag_store;
pub mod observed_behavior;
pub mod traits;
