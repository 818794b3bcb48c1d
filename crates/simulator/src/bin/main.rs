//! powsim CLI
//!
//! Runs a proof-of-work network simulation. Flags override the workload
//! preset, which overrides the chain preset, which overrides the defaults.

use clap::Parser;
use powsim_simulator::{
    CancelFlag, ConfigOverrides, PresetCatalog, ShardedSimulator, Simulator,
};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "powsim")]
#[command(about = "Discrete-event proof-of-work network simulator")]
#[command(version)]
struct Cli {
    /// Chain preset (btc, bch, ltc, doge, or a file under --preset-dir)
    #[arg(long)]
    chain: Option<String>,

    /// Workload preset (small, medium, large, or a file under --preset-dir)
    #[arg(long)]
    workload: Option<String>,

    /// Directory with chains/*.json and workloads/*.json presets
    #[arg(long)]
    preset_dir: Option<PathBuf>,

    /// Number of gossip nodes
    #[arg(long)]
    nodes: Option<u32>,

    /// Neighbors per node
    #[arg(long)]
    neighbors: Option<u32>,

    /// Number of miners
    #[arg(long)]
    miners: Option<u32>,

    /// Hashrate per miner (H/s)
    #[arg(long)]
    hashrate: Option<f64>,

    /// Target block time in seconds
    #[arg(long)]
    blocktime: Option<f64>,

    /// Pin the difficulty (disables retargeting)
    #[arg(long)]
    difficulty: Option<f64>,

    /// Transactions per block
    #[arg(long)]
    blocksize: Option<usize>,

    /// Number of wallets
    #[arg(long)]
    wallets: Option<u32>,

    /// Transactions per wallet
    #[arg(long)]
    transactions: Option<u64>,

    /// Seconds between a wallet's transactions
    #[arg(long)]
    interval: Option<f64>,

    /// Initial block reward
    #[arg(long)]
    reward: Option<f64>,

    /// Blocks between halvings (0 disables halving)
    #[arg(long)]
    halving: Option<u64>,

    /// Stop after this many blocks
    #[arg(long)]
    blocks: Option<u64>,

    /// Stop after this many simulated years
    #[arg(long)]
    years: Option<f64>,

    /// Blocks between periodic summaries
    #[arg(long)]
    print: Option<u64>,

    /// Log every round
    #[arg(long)]
    debug: bool,

    /// Order the mempool by fee rate and track miner balances
    #[arg(long)]
    fees: bool,

    /// Run one chain per latency cluster
    #[arg(long)]
    sharded: bool,

    /// Maximum worst-case latency within a shard (e.g. "100ms")
    #[arg(long)]
    shard_latency: Option<humantime::Duration>,

    /// Cap on a single delivery as a fraction of the block time
    #[arg(long)]
    max_delay_fraction: Option<f64>,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Wall-clock budget (e.g. "30s", "5m")
    #[arg(long)]
    max_wall_time: Option<humantime::Duration>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            nodes: self.nodes,
            neighbors: self.neighbors,
            miners: self.miners,
            hashrate: self.hashrate,
            blocktime: self.blocktime,
            difficulty: self.difficulty,
            blocksize: self.blocksize,
            wallets: self.wallets,
            transactions: self.transactions,
            interval: self.interval,
            reward: self.reward,
            halving: self.halving,
            blocks: self.blocks,
            years: self.years,
            print: self.print,
            debug: self.debug.then_some(true),
            fees: self.fees.then_some(true),
            sharded: self.sharded.then_some(true),
            seed: self.seed,
        }
    }
}

/// Ctrl-C stops the run between events; the final summary is still logged.
fn cancel_on_interrupt(flag: CancelFlag) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping");
        flag.cancel();
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let catalog = match &cli.preset_dir {
        Some(dir) => PresetCatalog::with_dir(dir)?,
        None => PresetCatalog::builtin(),
    };
    let mut config = catalog.resolve(
        cli.chain.as_deref(),
        cli.workload.as_deref(),
        &cli.overrides(),
    )?;
    if let Some(latency) = cli.shard_latency {
        config.sharding.max_latency = *latency;
    }
    if let Some(fraction) = cli.max_delay_fraction {
        config.network.max_delay_fraction = fraction;
    }
    if let Some(budget) = cli.max_wall_time {
        config.max_wall_time = Some(*budget);
    }

    if config.sharding.enabled {
        let mut simulator = ShardedSimulator::new(config)?;
        cancel_on_interrupt(simulator.cancel_flag())?;
        simulator.run()?;
    } else {
        let mut simulator = Simulator::new(config)?;
        cancel_on_interrupt(simulator.cancel_flag())?;
        simulator.run()?;
    }
    Ok(())
}
