//! Miner type.

use crate::{MinerId, ShardId};
use serde::{Deserialize, Serialize};

/// A miner participating in the per-round race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Miner {
    /// Miner identifier.
    pub id: MinerId,

    /// Hashes per second. Must be positive.
    pub hashrate: f64,

    /// Shard the miner works on (sharded runs only).
    pub shard: Option<ShardId>,
}

impl Miner {
    /// Create an unsharded miner.
    pub fn new(id: MinerId, hashrate: f64) -> Self {
        Self {
            id,
            hashrate,
            shard: None,
        }
    }

    /// Assign the miner to a shard.
    pub fn on_shard(mut self, shard: ShardId) -> Self {
        self.shard = Some(shard);
        self
    }
}

/// Sum of hashrates across a set of miners.
pub fn total_hashrate(miners: &[Miner]) -> f64 {
    miners.iter().map(|m| m.hashrate).sum()
}
