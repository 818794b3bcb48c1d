//! Priority-ordered mempool.

use powsim_types::Transaction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::trace;

/// How pending transactions are prioritized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingMode {
    /// Highest fee rate first; equal fee rates in submission order.
    FeeRate,
    /// Submission order only.
    #[default]
    Fifo,
}

/// Ordering key. Field order defines priority: fee rate descending, then
/// submission sequence ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PriorityKey {
    fee_rate: Reverse<u64>,
    sequence: u64,
}

/// Pool of pending transactions.
///
/// All access happens from scheduler callbacks on one thread, so there is
/// no internal locking.
#[derive(Debug, Default)]
pub struct Mempool {
    entries: BTreeMap<PriorityKey, Transaction>,
    mode: OrderingMode,
    next_sequence: u64,
}

impl Mempool {
    /// Create an empty pool with the given ordering.
    pub fn new(mode: OrderingMode) -> Self {
        Self {
            entries: BTreeMap::new(),
            mode,
            next_sequence: 0,
        }
    }

    /// Ordering mode of this pool.
    pub fn mode(&self) -> OrderingMode {
        self.mode
    }

    /// Insert a transaction. O(log n).
    pub fn submit(&mut self, tx: Transaction) {
        let fee_rate = match self.mode {
            OrderingMode::FeeRate => tx.fee_rate,
            OrderingMode::Fifo => 0,
        };
        let key = PriorityKey {
            fee_rate: Reverse(fee_rate),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        trace!(sender = %tx.sender, fee_rate = tx.fee_rate, depth = self.entries.len() + 1, "Transaction submitted");
        self.entries.insert(key, tx);
    }

    /// Remove and return up to `k` highest-priority transactions.
    ///
    /// Returns fewer than `k` when the pool is smaller; never fails.
    pub fn take_top(&mut self, k: usize) -> Vec<Transaction> {
        let take = k.min(self.entries.len());
        let mut taken = Vec::with_capacity(take);
        for _ in 0..take {
            match self.entries.pop_first() {
                Some((_, tx)) => taken.push(tx),
                None => break,
            }
        }
        taken
    }

    /// Highest-priority transaction without removing it.
    pub fn peek_top(&self) -> Option<&Transaction> {
        self.entries.values().next()
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of fees (in coins) of all pending transactions.
    pub fn total_fees(&self) -> f64 {
        self.entries.values().map(Transaction::fee).sum()
    }

    /// Iterate pending transactions in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powsim_test_helpers::{test_transaction, test_transaction_from};

    fn fee_pool(fees: &[u64]) -> Mempool {
        let mut pool = Mempool::new(OrderingMode::FeeRate);
        for &fee in fees {
            pool.submit(test_transaction(fee));
        }
        pool
    }

    #[test]
    fn test_take_top_draws_highest_fees() {
        let mut pool = fee_pool(&[5, 1, 9]);

        let block = pool.take_top(2);
        let fees: Vec<u64> = block.iter().map(|tx| tx.fee_rate).collect();
        assert_eq!(fees, vec![9, 5]);

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.peek_top().map(|tx| tx.fee_rate), Some(1));
    }

    #[test]
    fn test_take_top_never_exceeds_pool_size() {
        let mut pool = fee_pool(&[3, 3]);
        assert_eq!(pool.take_top(10).len(), 2);
        assert!(pool.is_empty());
        assert!(pool.take_top(4).is_empty());
        assert!(pool.take_top(0).is_empty());
    }

    #[test]
    fn test_returned_priorities_dominate_remaining() {
        let fees = [7, 2, 2, 11, 0, 5, 9, 1, 7, 3];
        let mut pool = fee_pool(&fees);

        let taken = pool.take_top(4);
        let min_taken = taken.iter().map(|tx| tx.fee_rate).min().unwrap();
        let max_left = pool.iter().map(|tx| tx.fee_rate).max().unwrap();
        assert!(min_taken >= max_left);
        assert_eq!(taken.len() + pool.len(), fees.len());
    }

    #[test]
    fn test_equal_fees_keep_submission_order() {
        let mut pool = Mempool::new(OrderingMode::FeeRate);
        for wallet in 0..4 {
            pool.submit(test_transaction_from(wallet, 6));
        }
        let senders: Vec<u32> = pool.take_top(4).iter().map(|tx| tx.sender.0).collect();
        assert_eq!(senders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_fifo_mode_ignores_fees() {
        let mut pool = Mempool::new(OrderingMode::Fifo);
        for (wallet, fee) in [(0, 1), (1, 50), (2, 3), (3, 99)] {
            pool.submit(test_transaction_from(wallet, fee));
        }

        let first_two: Vec<u32> = pool.take_top(2).iter().map(|tx| tx.sender.0).collect();
        assert_eq!(first_two, vec![0, 1]);

        let rest: Vec<u32> = pool.take_top(5).iter().map(|tx| tx.sender.0).collect();
        assert_eq!(rest, vec![2, 3]);
    }

    #[test]
    fn test_total_fees() {
        let pool = fee_pool(&[4, 0]);
        // 256-byte fixtures: 4 units/byte * 256 bytes
        assert!((pool.total_fees() - 1024.0 / 1e8).abs() < 1e-15);
    }
}
