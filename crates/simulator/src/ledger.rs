//! Block assembly and run-wide accounting.

use crate::config::SimulatorConfig;
use crate::metrics::BalanceEntry;
use powsim_core::RunStatistics;
use powsim_mempool::{Mempool, OrderingMode};
use powsim_types::{Block, BlockId, MinerId, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;

/// Mempool, counters, and miner balances shared by every chain in a run.
#[derive(Debug)]
pub(crate) struct Ledger {
    pub(crate) mempool: Mempool,
    pub(crate) stats: RunStatistics,
    balances: Option<BTreeMap<MinerId, f64>>,
    block_size: usize,
    tx_mode: bool,
    fee_mode: bool,
}

impl Ledger {
    pub(crate) fn new(config: &SimulatorConfig) -> Self {
        let fee_mode = config.workload.fees;
        let mode = if fee_mode {
            OrderingMode::FeeRate
        } else {
            OrderingMode::Fifo
        };
        Self {
            mempool: Mempool::new(mode),
            stats: RunStatistics::new(),
            balances: fee_mode.then(BTreeMap::new),
            block_size: config.block_size,
            tx_mode: config.has_transactions(),
            fee_mode,
        }
    }

    /// Fill a block from the mempool, record it, and credit the miner.
    ///
    /// In transaction mode the block takes up to `block_size` transactions
    /// plus the coinbase; otherwise it carries the coinbase only.
    pub(crate) fn seal(
        &mut self,
        id: BlockId,
        miner: MinerId,
        minted: f64,
        round_duration: Duration,
        now: Duration,
    ) -> Block {
        let (tx_count, included, fees) = if self.tx_mode {
            let txs = self.mempool.take_top(self.block_size);
            let fees: f64 = if self.fee_mode {
                txs.iter().map(Transaction::fee).sum()
            } else {
                0.0
            };
            (txs.len() as u64 + 1, txs.len() as u64, fees)
        } else {
            (1, 0, 0.0)
        };

        self.stats.record_block(tx_count, included, fees);
        self.stats.record_mint(minted);
        if let Some(balances) = &mut self.balances {
            *balances.entry(miner).or_insert(0.0) += minted + fees;
        }
        Block::new(id, miner, tx_count, round_duration, now).with_fees(fees)
    }

    /// Balance table, in fee mode.
    pub(crate) fn balances(&self) -> Option<Vec<BalanceEntry>> {
        self.balances.as_ref().map(|balances| {
            balances
                .iter()
                .map(|(&miner, &balance)| BalanceEntry { miner, balance })
                .collect()
        })
    }
}

/// When a run stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Termination {
    pub(crate) blocks_limit: Option<u64>,
    tx_target: Option<u64>,
}

impl Termination {
    pub(crate) fn new(config: &SimulatorConfig) -> Self {
        Self {
            blocks_limit: config.resolved_blocks_limit(),
            tx_target: config
                .has_transactions()
                .then(|| config.total_transactions()),
        }
    }

    /// Whether the block limit or the transaction target has been hit.
    pub(crate) fn reached(&self, blocks: u64, processed_tx: u64) -> bool {
        self.blocks_limit.is_some_and(|limit| blocks >= limit)
            || self.tx_target.is_some_and(|target| processed_tx >= target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadConfig;
    use powsim_test_helpers::test_transaction_from;

    fn tx_config(fees: bool) -> SimulatorConfig {
        SimulatorConfig::new()
            .with_block_size(2)
            .with_workload(WorkloadConfig::new(3, 1, Duration::from_secs(1)).with_fees(fees))
    }

    #[test]
    fn test_seal_takes_top_fees_plus_coinbase() {
        let mut ledger = Ledger::new(&tx_config(true));
        for (wallet, fee) in [(0, 5), (1, 1), (2, 9)] {
            ledger.mempool.submit(test_transaction_from(wallet, fee));
        }

        let block = ledger.seal(BlockId(1), MinerId(4), 50.0, Duration::from_secs(600), Duration::from_secs(600));
        assert_eq!(block.tx_count, 3);
        assert_eq!(ledger.mempool.len(), 1);
        assert_eq!(ledger.mempool.peek_top().map(|tx| tx.fee_rate), Some(1));
        assert_eq!(ledger.stats.processed_tx, 2);

        let expected_fees = (9.0 + 5.0) * 256.0 / 1e8;
        assert!((block.fees - expected_fees).abs() < 1e-15);
        let balances = ledger.balances().unwrap();
        assert_eq!(balances.len(), 1);
        assert!((balances[0].balance - (50.0 + expected_fees)).abs() < 1e-12);
    }

    #[test]
    fn test_seal_without_workload_is_coinbase_only() {
        let mut ledger = Ledger::new(&SimulatorConfig::new());
        ledger.mempool.submit(test_transaction_from(0, 3));
        let block = ledger.seal(BlockId(1), MinerId(0), 50.0, Duration::ZERO, Duration::ZERO);
        assert_eq!(block.tx_count, 1);
        assert_eq!(ledger.mempool.len(), 1);
        assert_eq!(ledger.stats.total_coins, 50.0);
        assert!(ledger.balances().is_none());
    }

    #[test]
    fn test_termination_on_blocks_or_transactions() {
        let termination = Termination::new(&tx_config(false).with_blocks_limit(10));
        // ceil(3 / 2) lowers the limit to 2.
        assert_eq!(termination.blocks_limit, Some(2));
        assert!(!termination.reached(1, 2));
        assert!(termination.reached(1, 3));
        assert!(termination.reached(2, 0));
    }
}
