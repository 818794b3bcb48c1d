//! Block type produced by a mining round.

use crate::{BlockId, MinerId, ShardId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed header size in bytes.
pub const HEADER_SIZE: u64 = 1024;

/// Bytes each included transaction adds to a block.
pub const TX_COST: u64 = 256;

/// A mined block.
///
/// Blocks are immutable once assembled. During propagation they are shared
/// behind an `Arc`; nodes only retain the [`BlockId`] in their seen-set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Sequence id (height) of this block.
    pub id: BlockId,

    /// Miner that won the round.
    pub miner: MinerId,

    /// Number of transactions, including the coinbase placeholder.
    pub tx_count: u64,

    /// Virtual time the round took.
    pub round_duration: Duration,

    /// Virtual time the block was mined.
    pub created_at: Duration,

    /// Fees collected from included transactions (in coins).
    pub fees: f64,

    /// Shard the block was mined on, if the run is sharded.
    pub shard: Option<ShardId>,
}

impl Block {
    /// Create a block for an unsharded chain.
    pub fn new(
        id: BlockId,
        miner: MinerId,
        tx_count: u64,
        round_duration: Duration,
        created_at: Duration,
    ) -> Self {
        Self {
            id,
            miner,
            tx_count,
            round_duration,
            created_at,
            fees: 0.0,
            shard: None,
        }
    }

    /// Attach collected fees.
    pub fn with_fees(mut self, fees: f64) -> Self {
        self.fees = fees;
        self
    }

    /// Tag the block with the shard it was mined on.
    pub fn with_shard(mut self, shard: ShardId) -> Self {
        self.shard = Some(shard);
        self
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        block_size_for(self.tx_count)
    }
}

/// Size in bytes of a block carrying `tx_count` transactions.
pub fn block_size_for(tx_count: u64) -> u64 {
    HEADER_SIZE + tx_count * TX_COST
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_is_function_of_tx_count() {
        let a = Block::new(BlockId(1), MinerId(0), 3, Duration::ZERO, Duration::ZERO);
        let b = Block::new(
            BlockId(9),
            MinerId(4),
            3,
            Duration::from_secs(600),
            Duration::from_secs(5400),
        );
        assert_eq!(a.size(), b.size());
        assert_eq!(a.size(), 1024 + 3 * 256);
    }

    #[test]
    fn test_coinbase_only_block() {
        assert_eq!(block_size_for(1), 1280);
        assert_eq!(block_size_for(0), HEADER_SIZE);
    }
}
