//! Cumulative run statistics.

use serde::Serialize;

/// Counters accumulated over a run.
///
/// Owned by the coordinator and passed by `&mut` to the propagation step;
/// nothing else mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Transactions included in blocks, coinbase placeholders included.
    pub total_tx: u64,
    /// Mempool transactions consumed by blocks.
    pub processed_tx: u64,
    /// Coins minted by the reward schedule.
    pub total_coins: f64,
    /// Fees paid to miners.
    pub total_fees: f64,
    /// Bytes sent between nodes.
    pub bytes_transferred: u64,
    /// Messages sent between nodes.
    pub messages: u64,
}

impl RunStatistics {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a block send to one neighbor.
    pub fn record_send(&mut self, bytes: u64) {
        self.messages += 1;
        self.bytes_transferred += bytes;
    }

    /// Record a block's transactions.
    ///
    /// `tx_count` includes the coinbase; `from_mempool` counts only pooled
    /// transactions consumed by the block.
    pub fn record_block(&mut self, tx_count: u64, from_mempool: u64, fees: f64) {
        self.total_tx += tx_count;
        self.processed_tx += from_mempool;
        self.total_fees += fees;
    }

    /// Record newly minted coins.
    pub fn record_mint(&mut self, amount: f64) {
        self.total_coins += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_send_counts_messages_and_bytes() {
        let mut stats = RunStatistics::new();
        stats.record_send(1280);
        stats.record_send(1280);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.bytes_transferred, 2560);
    }

    #[test]
    fn test_record_block() {
        let mut stats = RunStatistics::new();
        stats.record_block(3, 2, 0.5);
        stats.record_block(1, 0, 0.0);
        assert_eq!(stats.total_tx, 4);
        assert_eq!(stats.processed_tx, 2);
        assert!((stats.total_fees - 0.5).abs() < f64::EPSILON);
    }
}
