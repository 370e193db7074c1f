//! Common data types of the block DAG layer.

pub mod block;
pub mod deploy;
pub mod message;
mod node_id;
mod timestamp;

pub use block::{
    Block, BlockBody, BlockHash, BlockHeader, BlockInfo, BlockSummary, Bond, Justification,
    MessageType, ProtocolVersion, ValidatorId,
};
pub use deploy::{Approval, Deploy, DeployBody, DeployHash, DeployHeader};
pub use message::{Message, MessageError};
pub use node_id::NodeId;
pub use timestamp::{TimeDiff, Timestamp};
