//! Reports and metrics collection.
//!
//! The coordinator produces three kinds of report, all plain `Serialize`
//! structs handed to a [`ReportSink`]:
//!
//! - [`RoundRecord`] for every block in debug mode,
//! - [`PeriodicSummary`] every `print_interval` blocks otherwise,
//! - [`FinalSummary`] exactly once at the end of a run, however it ends.

use crate::format::human;
use hdrhistogram::{CreationError, Histogram};
use powsim_core::RunStatistics;
use powsim_types::{BlockId, MinerId, ShardId, YEAR_SECS};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// State after one accepted block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    /// Virtual time of acceptance.
    pub time: Duration,
    /// Block id.
    pub block: BlockId,
    /// Winning miner.
    pub miner: MinerId,
    /// Shard the block belongs to (sharded runs).
    pub shard: Option<ShardId>,
    /// Time since the previous block on the same chain.
    pub round_duration: Duration,
    /// Difficulty the block was mined at.
    pub difficulty: f64,
    /// Hashrate competing for the block.
    pub total_hashrate: f64,
    /// Transactions included so far, coinbases included.
    pub cumulative_tx: u64,
    /// Coins minted so far.
    pub cumulative_coins: f64,
    /// Transactions waiting in the mempool.
    pub mempool_depth: usize,
    /// Bytes sent between nodes so far.
    pub cumulative_bytes: u64,
    /// Messages sent between nodes so far.
    pub cumulative_messages: u64,
}

/// Progress since the previous checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodicSummary {
    /// Virtual time of the checkpoint.
    pub time: Duration,
    /// Blocks accepted so far.
    pub blocks: u64,
    /// Block limit, if any.
    pub blocks_limit: Option<u64>,
    /// Percentage of the block limit reached.
    pub progress_pct: f64,
    /// Average block time since the previous checkpoint, seconds.
    pub avg_block_time: f64,
    /// Transactions per second since the previous checkpoint.
    pub tps: f64,
    /// Supply growth since the previous checkpoint, annualized, percent.
    pub annualized_inflation: f64,
    /// Estimated virtual seconds until the block limit.
    pub eta: f64,
    /// Current difficulty.
    pub difficulty: f64,
    /// Total hashrate.
    pub total_hashrate: f64,
    /// Transactions included so far.
    pub cumulative_tx: u64,
    /// Coins minted so far.
    pub cumulative_coins: f64,
    /// Transactions waiting in the mempool.
    pub mempool_depth: usize,
    /// Bytes sent between nodes so far.
    pub cumulative_bytes: u64,
    /// Messages sent between nodes so far.
    pub cumulative_messages: u64,
}

/// Block propagation latency distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyPercentiles {
    /// Node acceptances recorded.
    pub samples: u64,
    /// Median, milliseconds.
    pub p50_ms: f64,
    /// 90th percentile, milliseconds.
    pub p90_ms: f64,
    /// 99th percentile, milliseconds.
    pub p99_ms: f64,
    /// Maximum, milliseconds.
    pub max_ms: f64,
}

/// End-of-run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalSummary {
    /// Blocks accepted.
    pub total_blocks: u64,
    /// Block limit, if any.
    pub blocks_limit: Option<u64>,
    /// Average block time over the run, seconds.
    pub avg_block_time: f64,
    /// Median time between blocks, seconds.
    pub median_block_time: Option<f64>,
    /// Transactions per second over the run.
    pub tps: f64,
    /// Supply growth since the last periodic checkpoint, annualized, percent.
    pub annualized_inflation: f64,
    /// Difficulty at the end (mean over shards when sharded).
    pub final_difficulty: f64,
    /// Total hashrate.
    pub total_hashrate: f64,
    /// Coins minted.
    pub total_supply: f64,
    /// Transactions included, coinbases included.
    pub total_tx: u64,
    /// Fees collected by miners.
    pub total_fees: f64,
    /// Transactions left in the mempool.
    pub mempool_depth: usize,
    /// Bytes sent between nodes.
    pub bytes_transferred: u64,
    /// Messages sent between nodes.
    pub messages: u64,
    /// Virtual time elapsed.
    pub simulated_time: Duration,
    /// Wall-clock time the run took.
    pub wall_time: Duration,
    /// Number of shards (1 when unsharded).
    pub shards: usize,
    /// The run was cancelled before its termination condition.
    pub cancelled: bool,
    /// Error that aborted the run, if any.
    pub error: Option<String>,
    /// Block propagation latency.
    pub propagation: Option<LatencyPercentiles>,
}

/// A miner's accumulated subsidy and fees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceEntry {
    /// Miner.
    pub miner: MinerId,
    /// Coins earned.
    pub balance: f64,
}

/// Destination for reports.
pub trait ReportSink {
    /// A block was accepted (debug mode).
    fn on_round(&mut self, record: &RoundRecord);

    /// A periodic checkpoint was reached.
    fn on_periodic(&mut self, summary: &PeriodicSummary);

    /// The run ended.
    fn on_final(&mut self, summary: &FinalSummary);

    /// Miner balances at the end of a fee-mode run.
    fn on_balances(&mut self, _balances: &[BalanceEntry]) {}
}

/// Logs reports as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn on_round(&mut self, r: &RoundRecord) {
        info!(
            time = r.time.as_secs_f64(),
            block = %r.block,
            miner = %r.miner,
            shard = ?r.shard,
            dt = r.round_duration.as_secs_f64(),
            difficulty = %human(r.difficulty),
            hashrate = %human(r.total_hashrate),
            tx = r.cumulative_tx,
            coins = %human(r.cumulative_coins),
            pool = r.mempool_depth,
            "Block"
        );
    }

    fn on_periodic(&mut self, s: &PeriodicSummary) {
        info!(
            time = s.time.as_secs_f64(),
            blocks = s.blocks,
            limit = ?s.blocks_limit,
            progress_pct = s.progress_pct,
            abt = s.avg_block_time,
            tps = s.tps,
            inflation_pct = s.annualized_inflation,
            eta = s.eta,
            difficulty = %human(s.difficulty),
            hashrate = %human(s.total_hashrate),
            tx = s.cumulative_tx,
            coins = %human(s.cumulative_coins),
            pool = s.mempool_depth,
            mb = s.cumulative_bytes as f64 / 1e6,
            io = s.cumulative_messages,
            "Summary"
        );
    }

    fn on_final(&mut self, s: &FinalSummary) {
        info!(
            blocks = s.total_blocks,
            limit = ?s.blocks_limit,
            abt = s.avg_block_time,
            median_bt = ?s.median_block_time,
            tps = s.tps,
            difficulty = %human(s.final_difficulty),
            hashrate = %human(s.total_hashrate),
            supply = %human(s.total_supply),
            tx = s.total_tx,
            pool = s.mempool_depth,
            mb = s.bytes_transferred as f64 / 1e6,
            io = s.messages,
            shards = s.shards,
            simulated_secs = s.simulated_time.as_secs_f64(),
            wall_secs = s.wall_time.as_secs_f64(),
            cancelled = s.cancelled,
            "Simulation finished"
        );
        if let Some(p) = s.propagation {
            info!(
                samples = p.samples,
                p50_ms = p.p50_ms,
                p90_ms = p.p90_ms,
                p99_ms = p.p99_ms,
                max_ms = p.max_ms,
                "Propagation latency"
            );
        }
        if let Some(error) = &s.error {
            warn!(error = %error, "Simulation aborted");
        }
    }

    fn on_balances(&mut self, balances: &[BalanceEntry]) {
        for entry in balances {
            info!(miner = %entry.miner, balance = entry.balance, "Miner balance");
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    /// Per-round records.
    pub rounds: Vec<RoundRecord>,
    /// Periodic summaries.
    pub periodic: Vec<PeriodicSummary>,
    /// Final summaries (one per run).
    pub finals: Vec<FinalSummary>,
    /// Balance tables.
    pub balances: Vec<Vec<BalanceEntry>>,
}

impl CollectingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for CollectingSink {
    fn on_round(&mut self, record: &RoundRecord) {
        self.rounds.push(record.clone());
    }

    fn on_periodic(&mut self, summary: &PeriodicSummary) {
        self.periodic.push(summary.clone());
    }

    fn on_final(&mut self, summary: &FinalSummary) {
        self.finals.push(summary.clone());
    }

    fn on_balances(&mut self, balances: &[BalanceEntry]) {
        self.balances.push(balances.to_vec());
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Checkpoint {
    time: Duration,
    blocks: u64,
    total_tx: u64,
    total_coins: f64,
}

/// Chain-level values a report needs besides [`RunStatistics`].
#[derive(Debug, Clone, Copy)]
pub struct ChainSnapshot {
    /// Virtual time.
    pub now: Duration,
    /// Blocks accepted.
    pub blocks: u64,
    /// Block limit.
    pub blocks_limit: Option<u64>,
    /// Current difficulty.
    pub difficulty: f64,
    /// Total hashrate.
    pub total_hashrate: f64,
    /// Mempool depth.
    pub mempool_depth: usize,
}

/// Longest trackable propagation latency: one hour, in microseconds.
const MAX_PROPAGATION_MICROS: u64 = 3_600 * 1_000_000;

/// Longest trackable block interval: a century, in milliseconds.
const MAX_BLOCK_INTERVAL_MILLIS: u64 = 100 * 365 * 24 * 3_600 * 1_000;

/// Tracks checkpoints and latency histograms for a run.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    checkpoint: Checkpoint,
    /// Block creation to node acceptance, microseconds.
    propagation: Histogram<u64>,
    /// Time between blocks, milliseconds.
    block_intervals: Histogram<u64>,
}

impl MetricsCollector {
    /// Create a collector.
    pub fn new() -> Result<Self, CreationError> {
        Ok(Self {
            checkpoint: Checkpoint::default(),
            propagation: Histogram::new_with_bounds(1, MAX_PROPAGATION_MICROS, 3)?,
            block_intervals: Histogram::new_with_bounds(1, MAX_BLOCK_INTERVAL_MILLIS, 3)?,
        })
    }

    /// Record one node's acceptance latency for a block.
    pub fn record_propagation(&mut self, latency: Duration) {
        self.propagation.saturating_record(latency.as_micros() as u64);
    }

    /// Record the time between two blocks.
    pub fn record_block_interval(&mut self, interval: Duration) {
        self.block_intervals
            .saturating_record(interval.as_millis() as u64);
    }

    /// Median block interval in seconds, if any block was recorded.
    pub fn median_block_interval(&self) -> Option<f64> {
        if self.block_intervals.is_empty() {
            return None;
        }
        Some(self.block_intervals.value_at_quantile(0.5) as f64 / 1000.0)
    }

    /// Propagation latency percentiles, if any acceptance was recorded.
    pub fn propagation_percentiles(&self) -> Option<LatencyPercentiles> {
        if self.propagation.is_empty() {
            return None;
        }
        let ms = |v: u64| v as f64 / 1000.0;
        Some(LatencyPercentiles {
            samples: self.propagation.len(),
            p50_ms: ms(self.propagation.value_at_quantile(0.50)),
            p90_ms: ms(self.propagation.value_at_quantile(0.90)),
            p99_ms: ms(self.propagation.value_at_quantile(0.99)),
            max_ms: ms(self.propagation.max()),
        })
    }

    /// Annualized supply growth since the last checkpoint, percent.
    pub fn inflation_since_checkpoint(&self, now: Duration, stats: &RunStatistics) -> f64 {
        let elapsed = now.saturating_sub(self.checkpoint.time).as_secs_f64();
        let last = self.checkpoint.total_coins;
        if last > 0.0 && elapsed > 0.0 {
            (stats.total_coins - last) / last * (YEAR_SECS / elapsed) * 100.0
        } else {
            0.0
        }
    }

    /// Summarize progress since the previous checkpoint and start a new one.
    pub fn checkpoint(&mut self, chain: ChainSnapshot, stats: &RunStatistics) -> PeriodicSummary {
        let elapsed = chain.now.saturating_sub(self.checkpoint.time).as_secs_f64();
        let blocks = chain.blocks.saturating_sub(self.checkpoint.blocks);
        let tx = stats.total_tx.saturating_sub(self.checkpoint.total_tx);

        let avg_block_time = if blocks > 0 { elapsed / blocks as f64 } else { 0.0 };
        let tps = if elapsed > 0.0 { tx as f64 / elapsed } else { 0.0 };
        let annualized_inflation = self.inflation_since_checkpoint(chain.now, stats);
        let (progress_pct, eta) = match chain.blocks_limit {
            Some(limit) if limit > 0 => (
                chain.blocks as f64 / limit as f64 * 100.0,
                limit.saturating_sub(chain.blocks) as f64 * avg_block_time,
            ),
            _ => (0.0, 0.0),
        };

        self.checkpoint = Checkpoint {
            time: chain.now,
            blocks: chain.blocks,
            total_tx: stats.total_tx,
            total_coins: stats.total_coins,
        };

        PeriodicSummary {
            time: chain.now,
            blocks: chain.blocks,
            blocks_limit: chain.blocks_limit,
            progress_pct,
            avg_block_time,
            tps,
            annualized_inflation,
            eta,
            difficulty: chain.difficulty,
            total_hashrate: chain.total_hashrate,
            cumulative_tx: stats.total_tx,
            cumulative_coins: stats.total_coins,
            mempool_depth: chain.mempool_depth,
            cumulative_bytes: stats.bytes_transferred,
            cumulative_messages: stats.messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn snapshot(now_secs: u64, blocks: u64) -> ChainSnapshot {
        ChainSnapshot {
            now: Duration::from_secs(now_secs),
            blocks,
            blocks_limit: Some(100),
            difficulty: 600.0,
            total_hashrate: 1.0,
            mempool_depth: 0,
        }
    }

    #[test]
    fn test_first_checkpoint_has_no_inflation() {
        let mut metrics = MetricsCollector::new().unwrap();
        let stats = RunStatistics {
            total_tx: 10,
            total_coins: 500.0,
            ..Default::default()
        };
        let summary = metrics.checkpoint(snapshot(6000, 10), &stats);
        assert_eq!(summary.avg_block_time, 600.0);
        assert!((summary.tps - 10.0 / 6000.0).abs() < 1e-12);
        assert_eq!(summary.annualized_inflation, 0.0);
        assert_eq!(summary.progress_pct, 10.0);
        assert_eq!(summary.eta, 90.0 * 600.0);
    }

    #[test]
    fn test_inflation_is_annualized_from_last_checkpoint() {
        let mut metrics = MetricsCollector::new().unwrap();
        let mut stats = RunStatistics {
            total_coins: 1000.0,
            ..Default::default()
        };
        metrics.checkpoint(snapshot(1000, 1), &stats);

        // +10% over a tenth of a year -> 100% annualized.
        stats.total_coins = 1100.0;
        let later = 1000 + (YEAR_SECS / 10.0) as u64;
        let summary = metrics.checkpoint(snapshot(later, 2), &stats);
        assert!((summary.annualized_inflation - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_propagation_percentiles() {
        let mut metrics = MetricsCollector::new().unwrap();
        assert!(metrics.propagation_percentiles().is_none());
        for ms in 1..=100 {
            metrics.record_propagation(Duration::from_millis(ms));
        }
        let p = metrics.propagation_percentiles().unwrap();
        assert_eq!(p.samples, 100);
        assert!((p.p50_ms - 50.0).abs() < 0.1);
        assert!((p.max_ms - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_long_latencies_are_not_truncated() {
        let mut metrics = MetricsCollector::new().unwrap();
        metrics.record_propagation(Duration::from_millis(40));
        let p = metrics.propagation_percentiles().unwrap();
        assert!((p.p50_ms - 40.0).abs() < 0.1);
        assert!((p.max_ms - 40.0).abs() < 0.1);
    }

    #[test]
    fn test_median_block_interval() {
        let mut metrics = MetricsCollector::new().unwrap();
        assert!(metrics.median_block_interval().is_none());
        for secs in [300, 600, 900] {
            metrics.record_block_interval(Duration::from_secs(secs));
        }
        let median = metrics.median_block_interval().unwrap();
        assert!((median - 600.0).abs() < 1.0);
    }

    #[traced_test]
    #[test]
    fn test_round_records_pass_the_default_filter() {
        let record = RoundRecord {
            time: Duration::from_secs(600),
            block: BlockId(7),
            miner: MinerId(2),
            shard: None,
            round_duration: Duration::from_secs(600),
            difficulty: 600_000.0,
            total_hashrate: 1000.0,
            cumulative_tx: 7,
            cumulative_coins: 350.0,
            mempool_depth: 0,
            cumulative_bytes: 0,
            cumulative_messages: 0,
        };
        TracingSink.on_round(&record);
        logs_assert(|lines: &[&str]| {
            match lines.iter().any(|l| l.contains("INFO") && l.contains("Block")) {
                true => Ok(()),
                false => Err("round record not logged at info".to_string()),
            }
        });
    }

    #[test]
    fn test_collecting_sink_keeps_reports() {
        let mut sink = CollectingSink::new();
        sink.on_balances(&[BalanceEntry {
            miner: MinerId(1),
            balance: 3.0,
        }]);
        assert_eq!(sink.balances.len(), 1);
        assert_eq!(sink.balances[0][0].miner, MinerId(1));
    }
}
