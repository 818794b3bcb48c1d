//! Inputs delivered to state machines by the scheduler.

use powsim_types::{Block, MinerId, NodeIndex, ShardId, WalletId};
use std::sync::Arc;

/// All events the simulator schedules.
///
/// Events are delivered in virtual-time order; events scheduled for the same
/// instant are delivered in the order they were submitted.
#[derive(Debug, Clone)]
pub enum Event {
    /// A wallet's transaction interval elapsed.
    WalletTick {
        /// Wallet that should submit its next transaction.
        wallet: WalletId,
    },

    /// A miner finished its proof-of-work attempt for a round.
    ///
    /// Only the first attempt of a round is ever delivered; the scheduler
    /// abandons the remaining branches of the race.
    MiningAttemptFinished {
        /// Round the attempt belongs to.
        round: u64,
        /// Miner whose attempt finished.
        miner: MinerId,
        /// Shard the race ran on (sharded runs only).
        shard: Option<ShardId>,
    },

    /// Every shard race of a sharded round has resolved.
    ShardRoundJoined {
        /// Global round number.
        round: u64,
    },

    /// A block arrived at a node.
    BlockDelivered {
        /// Receiving node.
        node: NodeIndex,
        /// The block, shared between all in-flight deliveries.
        block: Arc<Block>,
        /// Number of network hops from the entry node.
        hops: u32,
    },
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::WalletTick { .. } => "WalletTick",
            Event::MiningAttemptFinished { .. } => "MiningAttemptFinished",
            Event::ShardRoundJoined { .. } => "ShardRoundJoined",
            Event::BlockDelivered { .. } => "BlockDelivered",
        }
    }
}
