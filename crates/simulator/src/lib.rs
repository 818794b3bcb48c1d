//! powsim simulator
//!
//! Drives a proof-of-work network simulation on top of the event-driven
//! building blocks in `powsim-simulation`.
//!
//! # Architecture
//!
//! - **Configuration**: [`SimulatorConfig`] with builder methods, built-in and
//!   file-based presets layered by [`PresetCatalog`]
//! - **Workload**: [`Wallets`] submit transactions produced by a
//!   [`WorkloadGenerator`] into the shared mempool
//! - **Coordinators**: [`Simulator`] runs a single chain, [`ShardedSimulator`]
//!   runs one chain per latency cluster
//! - **Reporting**: round records, periodic and final summaries delivered to a
//!   [`ReportSink`]
//!
//! # Example
//!
//! ```ignore
//! use powsim_simulator::{Simulator, SimulatorConfig};
//! use std::time::Duration;
//!
//! let config = SimulatorConfig::new()
//!     .with_miners(10, 1000.0)
//!     .with_target_block_time(Duration::from_secs(600))
//!     .with_blocks_limit(1000);
//!
//! let mut simulator = Simulator::new(config)?;
//! let summary = simulator.run()?;
//! println!("average block time: {:.1}s", summary.avg_block_time);
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod format;
mod ledger;
pub mod metrics;
pub mod presets;
pub mod runner;
pub mod shards;
pub mod wallets;
pub mod workload;

pub use cancel::CancelFlag;
pub use config::{ConfigError, ShardingConfig, SimulatorConfig, WorkloadConfig};
pub use error::SimulationError;
pub use metrics::{
    BalanceEntry, CollectingSink, FinalSummary, LatencyPercentiles, MetricsCollector,
    PeriodicSummary, ReportSink, RoundRecord, TracingSink,
};
pub use presets::{ConfigOverrides, PresetCatalog, PresetError, PresetKind};
pub use runner::{Phase, Simulator};
pub use shards::{ShardChain, ShardedSimulator};
pub use wallets::Wallets;
pub use workload::{FeeWorkload, WorkloadGenerator};
