//! Outputs returned by state machines.

use powsim_types::{Block, BlockId, NodeIndex};
use std::sync::Arc;

/// Actions a gossip node asks the runner to perform.
///
/// Nodes never touch the network or the statistics directly; the runner
/// turns actions into scheduled deliveries and counter updates.
#[derive(Debug, Clone)]
pub enum Action {
    /// The node saw this block for the first time.
    BlockAccepted {
        /// Node that accepted the block.
        node: NodeIndex,
        /// Accepted block id.
        block: BlockId,
        /// Hops from the entry node.
        hops: u32,
    },

    /// Send a block to a neighbor.
    ForwardBlock {
        /// Sending node.
        from: NodeIndex,
        /// Receiving neighbor.
        to: NodeIndex,
        /// The block being forwarded.
        block: Arc<Block>,
        /// Hop count the neighbor will observe.
        hops: u32,
    },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::BlockAccepted { .. } => "BlockAccepted",
            Action::ForwardBlock { .. } => "ForwardBlock",
        }
    }
}
