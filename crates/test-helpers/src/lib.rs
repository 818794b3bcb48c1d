//! Shared fixtures for tests across the workspace.

use powsim_types::{Block, BlockId, Miner, MinerId, Transaction, WalletId};
use std::sync::Arc;
use std::time::Duration;

/// Transaction size used by fixtures, equal to the per-transaction block cost.
pub const TEST_TX_SIZE: u64 = 256;

/// A transaction from wallet 0 with the given fee rate.
pub fn test_transaction(fee_rate: u64) -> Transaction {
    test_transaction_from(0, fee_rate)
}

/// A transaction from `wallet` with the given fee rate.
pub fn test_transaction_from(wallet: u32, fee_rate: u64) -> Transaction {
    Transaction::new(WalletId(wallet), TEST_TX_SIZE, fee_rate, Duration::ZERO)
}

/// A block mined by miner 0 at time zero.
pub fn test_block(id: u64, tx_count: u64) -> Arc<Block> {
    Arc::new(Block::new(
        BlockId(id),
        MinerId(0),
        tx_count,
        Duration::ZERO,
        Duration::ZERO,
    ))
}

/// `count` miners with identical hashrate.
pub fn test_miners(count: u32, hashrate: f64) -> Vec<Miner> {
    (0..count).map(|i| Miner::new(MinerId(i), hashrate)).collect()
}

/// Directed line adjacency: node `i` lists only node `i + 1`.
pub fn line_adjacency(nodes: u32) -> Vec<Vec<u32>> {
    (0..nodes)
        .map(|i| if i + 1 < nodes { vec![i + 1] } else { vec![] })
        .collect()
}
