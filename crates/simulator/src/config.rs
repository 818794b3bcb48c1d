//! Configuration types for the simulator.

use powsim_simulation::NetworkConfig;
use powsim_types::YEAR_SECS;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration, detected before the run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// No nodes to propagate blocks.
    #[error("node count must be positive")]
    NoNodes,

    /// Out-degree cannot be satisfied without self loops.
    #[error("neighbor count {neighbors} must be less than node count {nodes}")]
    TooManyNeighbors {
        /// Requested neighbors per node.
        neighbors: u32,
        /// Node count.
        nodes: u32,
    },

    /// No miners to race.
    #[error("miner count must be positive")]
    NoMiners,

    /// Per-miner hashrate is zero, negative, or not finite.
    #[error("hashrate must be positive and finite, got {0}")]
    InvalidHashrate(f64),

    /// Target block time is zero, negative, or not finite.
    #[error("target block time must be positive, got {0}s")]
    InvalidBlockTime(f64),

    /// Difficulty override is zero, negative, or not finite.
    #[error("difficulty override must be positive and finite, got {0}")]
    InvalidDifficulty(f64),

    /// Blocks cannot hold any transactions.
    #[error("block size must be positive")]
    ZeroBlockSize,

    /// Periodic reports would never fire.
    #[error("print interval must be positive")]
    ZeroPrintInterval,

    /// Transaction interval is negative or not finite.
    #[error("transaction interval must be non-negative, got {0}s")]
    InvalidInterval(f64),

    /// Run duration in years is negative or not finite.
    #[error("run duration must be non-negative, got {0} years")]
    InvalidYears(f64),

    /// Nothing would ever stop the run.
    #[error("no termination condition: set a block limit, a duration, or a transaction workload")]
    NoTermination,

    /// Fee range is inverted.
    #[error("fee range {min}..={max} is empty")]
    InvalidFeeRange {
        /// Lowest fee rate.
        min: u64,
        /// Highest fee rate.
        max: u64,
    },

    /// Location table is empty.
    #[error("network needs at least one location")]
    NoLocations,

    /// Bandwidth table is empty or has a non-positive entry.
    #[error("bandwidth table must be non-empty and positive")]
    InvalidBandwidth,

    /// Delivery cap fraction is not positive.
    #[error("max delay fraction must be positive, got {0}")]
    InvalidDelayFraction(f64),
}

/// Convert seconds to a duration, rejecting negative and non-finite input.
pub fn secs_to_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// Configuration for a simulation run.
#[derive(Clone, Debug, Serialize)]
pub struct SimulatorConfig {
    /// Number of gossiping nodes.
    pub nodes: u32,

    /// Outgoing neighbors per node.
    pub neighbors: u32,

    /// Number of miners.
    pub miners: u32,

    /// Hashrate of each miner.
    pub hashrate: f64,

    /// Target time between blocks.
    pub target_block_time: Duration,

    /// Fixed difficulty. Disables retargeting when set.
    pub difficulty: Option<f64>,

    /// Maximum transactions per block, excluding the coinbase.
    pub block_size: usize,

    /// Subsidy of the first block.
    pub initial_reward: f64,

    /// Blocks between halvings (0 = never).
    pub halving_interval: u64,

    /// Explicit block limit.
    pub blocks_limit: Option<u64>,

    /// Run length in years, used when no block limit is set.
    pub years: Option<f64>,

    /// Blocks between periodic summaries.
    pub print_interval: u64,

    /// Emit a record for every round instead of periodic summaries.
    pub debug: bool,

    /// Workload configuration.
    pub workload: WorkloadConfig,

    /// Latency model configuration.
    pub network: NetworkConfig,

    /// Sharding configuration.
    pub sharding: ShardingConfig,

    /// Random seed for deterministic simulation.
    pub seed: u64,

    /// Wall-clock budget after which the run is cancelled.
    pub max_wall_time: Option<Duration>,
}

impl SimulatorConfig {
    /// Default configuration: 10 nodes, 10 miners, Bitcoin-like chain, no
    /// transaction workload.
    pub fn new() -> Self {
        Self {
            nodes: 10,
            neighbors: 3,
            miners: 10,
            hashrate: 1000.0,
            target_block_time: Duration::from_secs(600),
            difficulty: None,
            block_size: 4000,
            initial_reward: 50.0,
            halving_interval: 210_000,
            blocks_limit: None,
            years: None,
            print_interval: 144,
            debug: false,
            workload: WorkloadConfig::default(),
            network: NetworkConfig::default(),
            sharding: ShardingConfig::default(),
            seed: 12345,
            max_wall_time: None,
        }
    }

    /// Set node count and out-degree.
    pub fn with_nodes(mut self, nodes: u32, neighbors: u32) -> Self {
        self.nodes = nodes;
        self.neighbors = neighbors;
        self
    }

    /// Set miner count and per-miner hashrate.
    pub fn with_miners(mut self, miners: u32, hashrate: f64) -> Self {
        self.miners = miners;
        self.hashrate = hashrate;
        self
    }

    /// Set the target block time.
    pub fn with_target_block_time(mut self, block_time: Duration) -> Self {
        self.target_block_time = block_time;
        self
    }

    /// Pin the difficulty.
    pub fn with_difficulty(mut self, difficulty: f64) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Set block capacity in transactions.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the reward schedule.
    pub fn with_reward(mut self, initial_reward: f64, halving_interval: u64) -> Self {
        self.initial_reward = initial_reward;
        self.halving_interval = halving_interval;
        self
    }

    /// Stop after `blocks` blocks.
    pub fn with_blocks_limit(mut self, blocks: u64) -> Self {
        self.blocks_limit = Some(blocks);
        self
    }

    /// Stop after `years` of simulated time (when no block limit is set).
    pub fn with_years(mut self, years: f64) -> Self {
        self.years = Some(years);
        self
    }

    /// Set the periodic summary interval.
    pub fn with_print_interval(mut self, blocks: u64) -> Self {
        self.print_interval = blocks;
        self
    }

    /// Toggle per-round records.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the workload configuration.
    pub fn with_workload(mut self, workload: WorkloadConfig) -> Self {
        self.workload = workload;
        self
    }

    /// Set the network configuration.
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Set the sharding configuration.
    pub fn with_sharding(mut self, sharding: ShardingConfig) -> Self {
        self.sharding = sharding;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Cancel the run after `budget` of wall-clock time.
    pub fn with_max_wall_time(mut self, budget: Duration) -> Self {
        self.max_wall_time = Some(budget);
        self
    }

    /// Combined hashrate of all miners.
    pub fn total_hashrate(&self) -> f64 {
        f64::from(self.miners) * self.hashrate
    }

    /// Whether wallets submit transactions.
    pub fn has_transactions(&self) -> bool {
        self.workload.transactions_per_wallet > 0
    }

    /// Transactions the workload will submit in total.
    pub fn total_transactions(&self) -> u64 {
        u64::from(self.workload.wallets) * self.workload.transactions_per_wallet
    }

    /// Effective block limit.
    ///
    /// An explicit limit wins over one derived from `years`. With a
    /// transaction workload the limit is lowered to the number of blocks
    /// needed to drain it, or set to that when no limit is given.
    pub fn resolved_blocks_limit(&self) -> Option<u64> {
        let mut limit = self.blocks_limit.or_else(|| {
            let bt = self.target_block_time.as_secs_f64();
            self.years
                .filter(|_| bt > 0.0)
                .map(|years| (years * YEAR_SECS / bt) as u64)
        });

        if self.has_transactions() {
            let needed = expected_blocks(self.total_transactions(), self.block_size as u64);
            limit = Some(limit.map_or(needed, |l| l.min(needed)));
        }
        limit
    }

    /// Check the configuration before building a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::NoNodes);
        }
        if self.neighbors >= self.nodes {
            return Err(ConfigError::TooManyNeighbors {
                neighbors: self.neighbors,
                nodes: self.nodes,
            });
        }
        if self.miners == 0 {
            return Err(ConfigError::NoMiners);
        }
        if !self.hashrate.is_finite() || self.hashrate <= 0.0 {
            return Err(ConfigError::InvalidHashrate(self.hashrate));
        }
        if self.target_block_time.is_zero() {
            return Err(ConfigError::InvalidBlockTime(0.0));
        }
        if let Some(difficulty) = self.difficulty {
            if !difficulty.is_finite() || difficulty <= 0.0 {
                return Err(ConfigError::InvalidDifficulty(difficulty));
            }
        }
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.print_interval == 0 {
            return Err(ConfigError::ZeroPrintInterval);
        }
        if let Some(years) = self.years {
            if !years.is_finite() || years < 0.0 {
                return Err(ConfigError::InvalidYears(years));
            }
        }
        self.workload.validate()?;
        validate_network(&self.network)?;
        if self.resolved_blocks_limit().is_none() {
            return Err(ConfigError::NoTermination);
        }
        Ok(())
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks needed to include `total_tx` transactions at `block_size` each.
pub fn expected_blocks(total_tx: u64, block_size: u64) -> u64 {
    if total_tx == 0 || block_size == 0 {
        return 0;
    }
    total_tx.div_ceil(block_size)
}

fn validate_network(network: &NetworkConfig) -> Result<(), ConfigError> {
    if network.locations.is_empty() {
        return Err(ConfigError::NoLocations);
    }
    if network.bandwidths_mbps.is_empty()
        || network
            .bandwidths_mbps
            .iter()
            .any(|b| !b.is_finite() || *b <= 0.0)
    {
        return Err(ConfigError::InvalidBandwidth);
    }
    if !network.max_delay_fraction.is_finite() || network.max_delay_fraction <= 0.0 {
        return Err(ConfigError::InvalidDelayFraction(network.max_delay_fraction));
    }
    Ok(())
}

/// Workload configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkloadConfig {
    /// Number of wallets.
    pub wallets: u32,

    /// Transactions each wallet submits (0 = no workload).
    pub transactions_per_wallet: u64,

    /// Time between a wallet's submissions.
    pub interval: Duration,

    /// Order the mempool by fee rate and pay fees to miners.
    pub fees: bool,

    /// Fee rates drawn uniformly from this range, in base units per byte.
    pub fee_rate: (u64, u64),

    /// Transaction size in bytes.
    pub tx_size: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            wallets: 10,
            transactions_per_wallet: 0,
            interval: Duration::from_secs(10),
            fees: false,
            fee_rate: (1, 100),
            tx_size: 256,
        }
    }
}

impl WorkloadConfig {
    /// Workload of `wallets` wallets each submitting `per_wallet`
    /// transactions every `interval`.
    pub fn new(wallets: u32, per_wallet: u64, interval: Duration) -> Self {
        Self {
            wallets,
            transactions_per_wallet: per_wallet,
            interval,
            ..Default::default()
        }
    }

    /// Enable fee ordering and miner fee credit.
    pub fn with_fees(mut self, fees: bool) -> Self {
        self.fees = fees;
        self
    }

    /// Set the fee-rate range.
    pub fn with_fee_rate(mut self, min: u64, max: u64) -> Self {
        self.fee_rate = (min, max);
        self
    }

    /// Set the transaction size.
    pub fn with_tx_size(mut self, size: u64) -> Self {
        self.tx_size = size;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = self.fee_rate;
        if min > max {
            return Err(ConfigError::InvalidFeeRange { min, max });
        }
        Ok(())
    }
}

/// Sharding configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShardingConfig {
    /// Run one chain per latency cluster.
    pub enabled: bool,

    /// Nodes within this worst-case latency of a shard's seed join it.
    pub max_latency: Duration,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_latency: Duration::from_millis(100),
        }
    }
}

impl ShardingConfig {
    /// Sharding on, with the given latency threshold.
    pub fn enabled(max_latency: Duration) -> Self {
        Self {
            enabled: true,
            max_latency,
        }
    }
}
