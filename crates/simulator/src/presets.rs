//! Chain and workload presets.
//!
//! A preset is a partial configuration. Settings are layered as
//! explicit overrides > workload preset > chain preset > built-in default.
//!
//! Built-in presets can be extended or replaced from a directory laid out
//! as `<dir>/chains/<name>.json` and `<dir>/workloads/<name>.json`. Files
//! are either flat objects or wrap their settings in a `"simulation"` key;
//! unknown keys are ignored.

use crate::config::{secs_to_duration, ConfigError, SimulatorConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors resolving presets.
#[derive(Debug, Error)]
pub enum PresetError {
    /// No preset of that kind and name.
    #[error("unknown {kind} preset '{name}' (available: {})", .available.join(", "))]
    Unknown {
        /// Chain or workload.
        kind: PresetKind,
        /// Requested name.
        name: String,
        /// Valid names.
        available: Vec<String>,
    },

    /// Preset file could not be read.
    #[error("failed to read preset {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Preset file is not valid JSON for a preset.
    #[error("failed to parse preset {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The layered values do not form a valid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Which layer a preset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PresetKind {
    /// Chain parameters: block time, reward, halving, block size.
    Chain,
    /// Wallet workload.
    Workload,
}

impl PresetKind {
    fn dir_name(self) -> &'static str {
        match self {
            PresetKind::Chain => "chains",
            PresetKind::Workload => "workloads",
        }
    }
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetKind::Chain => write!(f, "chain"),
            PresetKind::Workload => write!(f, "workload"),
        }
    }
}

/// Partial configuration. Every field is optional; set fields replace
/// the value beneath them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    /// Gossip node count.
    pub nodes: Option<u32>,
    /// Outgoing neighbors per node.
    pub neighbors: Option<u32>,
    /// Miner count.
    pub miners: Option<u32>,
    /// Hashrate per miner, H/s.
    pub hashrate: Option<f64>,
    /// Target block time in seconds.
    pub blocktime: Option<f64>,
    /// Pinned difficulty.
    pub difficulty: Option<f64>,
    /// Transactions per block.
    pub blocksize: Option<usize>,
    /// Wallet count.
    pub wallets: Option<u32>,
    /// Transactions each wallet submits.
    pub transactions: Option<u64>,
    /// Seconds between a wallet's submissions.
    pub interval: Option<f64>,
    /// Initial block subsidy.
    #[serde(alias = "init_reward")]
    pub reward: Option<f64>,
    /// Blocks between halvings.
    #[serde(alias = "halving_interval")]
    pub halving: Option<u64>,
    /// Block limit.
    #[serde(alias = "blocks_limit")]
    pub blocks: Option<u64>,
    /// Run length in simulated years.
    pub years: Option<f64>,
    /// Blocks between periodic summaries.
    #[serde(alias = "print_int")]
    pub print: Option<u64>,
    /// Per-round records instead of periodic summaries.
    pub debug: Option<bool>,
    /// Fee-ordered mempool and miner balances.
    pub fees: Option<bool>,
    /// One chain per latency cluster.
    pub sharded: Option<bool>,
    /// RNG seed.
    pub seed: Option<u64>,
}

impl ConfigOverrides {
    /// Apply the set fields on top of `config`.
    pub fn apply(&self, mut config: SimulatorConfig) -> Result<SimulatorConfig, ConfigError> {
        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(neighbors) = self.neighbors {
            config.neighbors = neighbors;
        }
        if let Some(miners) = self.miners {
            config.miners = miners;
        }
        if let Some(hashrate) = self.hashrate {
            config.hashrate = hashrate;
        }
        if let Some(secs) = self.blocktime {
            config.target_block_time =
                secs_to_duration(secs).ok_or(ConfigError::InvalidBlockTime(secs))?;
        }
        if self.difficulty.is_some() {
            config.difficulty = self.difficulty;
        }
        if let Some(blocksize) = self.blocksize {
            config.block_size = blocksize;
        }
        if let Some(wallets) = self.wallets {
            config.workload.wallets = wallets;
        }
        if let Some(transactions) = self.transactions {
            config.workload.transactions_per_wallet = transactions;
        }
        if let Some(secs) = self.interval {
            config.workload.interval =
                secs_to_duration(secs).ok_or(ConfigError::InvalidInterval(secs))?;
        }
        if let Some(reward) = self.reward {
            config.initial_reward = reward;
        }
        if let Some(halving) = self.halving {
            config.halving_interval = halving;
        }
        if self.blocks.is_some() {
            config.blocks_limit = self.blocks;
        }
        if self.years.is_some() {
            config.years = self.years;
        }
        if let Some(print) = self.print {
            config.print_interval = print;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(fees) = self.fees {
            config.workload.fees = fees;
        }
        if let Some(sharded) = self.sharded {
            config.sharding.enabled = sharded;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn chain(blocktime: f64, reward: f64, halving: u64, blocksize: usize) -> ConfigOverrides {
    ConfigOverrides {
        blocktime: Some(blocktime),
        reward: Some(reward),
        halving: Some(halving),
        blocksize: Some(blocksize),
        ..Default::default()
    }
}

fn workload(wallets: u32, transactions: u64, interval: f64) -> ConfigOverrides {
    ConfigOverrides {
        wallets: Some(wallets),
        transactions: Some(transactions),
        interval: Some(interval),
        ..Default::default()
    }
}

/// Named presets of both kinds.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    chains: BTreeMap<String, ConfigOverrides>,
    workloads: BTreeMap<String, ConfigOverrides>,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PresetCatalog {
    /// Built-in presets only.
    pub fn builtin() -> Self {
        let chains = [
            ("btc", chain(600.0, 50.0, 210_000, 4000)),
            ("bch", chain(600.0, 50.0, 210_000, 32_000)),
            ("ltc", chain(150.0, 50.0, 840_000, 4000)),
            ("doge", chain(60.0, 10_000.0, 0, 4000)),
        ];
        let workloads = [
            ("small", workload(10, 10, 1.0)),
            ("medium", workload(100, 100, 1.0)),
            ("large", workload(1000, 1000, 0.1)),
        ];
        Self {
            chains: chains.into_iter().map(|(n, p)| (n.to_string(), p)).collect(),
            workloads: workloads.into_iter().map(|(n, p)| (n.to_string(), p)).collect(),
        }
    }

    /// Built-in presets plus every JSON file under `dir`. Files replace
    /// built-ins of the same name. Missing subdirectories are skipped.
    pub fn with_dir(dir: &Path) -> Result<Self, PresetError> {
        let mut catalog = Self::builtin();
        for kind in [PresetKind::Chain, PresetKind::Workload] {
            let sub = dir.join(kind.dir_name());
            if !sub.is_dir() {
                continue;
            }
            let entries = fs::read_dir(&sub).map_err(|source| PresetError::Io {
                path: sub.clone(),
                source,
            })?;
            for entry in entries {
                let path = entry
                    .map_err(|source| PresetError::Io {
                        path: sub.clone(),
                        source,
                    })?
                    .path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let preset = load_file(&path)?;
                debug!(%kind, name, path = %path.display(), "Loaded preset");
                catalog.insert(kind, name, preset);
            }
        }
        Ok(catalog)
    }

    /// Add or replace a preset.
    pub fn insert(&mut self, kind: PresetKind, name: &str, preset: ConfigOverrides) {
        self.table_mut(kind).insert(name.to_string(), preset);
    }

    /// Look up a preset by name.
    pub fn get(&self, kind: PresetKind, name: &str) -> Result<&ConfigOverrides, PresetError> {
        let table = self.table(kind);
        table.get(name).ok_or_else(|| PresetError::Unknown {
            kind,
            name: name.to_string(),
            available: table.keys().cloned().collect(),
        })
    }

    /// Names of every preset of `kind`, sorted.
    pub fn names(&self, kind: PresetKind) -> Vec<&str> {
        self.table(kind).keys().map(String::as_str).collect()
    }

    /// Layer presets and explicit overrides onto the default config.
    pub fn resolve(
        &self,
        chain: Option<&str>,
        workload: Option<&str>,
        explicit: &ConfigOverrides,
    ) -> Result<SimulatorConfig, PresetError> {
        let mut config = SimulatorConfig::new();
        if let Some(name) = chain {
            config = self.get(PresetKind::Chain, name)?.apply(config)?;
        }
        if let Some(name) = workload {
            config = self.get(PresetKind::Workload, name)?.apply(config)?;
        }
        Ok(explicit.apply(config)?)
    }

    fn table(&self, kind: PresetKind) -> &BTreeMap<String, ConfigOverrides> {
        match kind {
            PresetKind::Chain => &self.chains,
            PresetKind::Workload => &self.workloads,
        }
    }

    fn table_mut(&mut self, kind: PresetKind) -> &mut BTreeMap<String, ConfigOverrides> {
        match kind {
            PresetKind::Chain => &mut self.chains,
            PresetKind::Workload => &mut self.workloads,
        }
    }
}

/// Parse one preset file.
pub fn load_file(path: &Path) -> Result<ConfigOverrides, PresetError> {
    let text = fs::read_to_string(path).map_err(|source| PresetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |source: serde_json::Error| PresetError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let mut value: serde_json::Value = serde_json::from_str(&text).map_err(parse_err)?;
    if let Some(inner) = value.get_mut("simulation").map(serde_json::Value::take) {
        value = inner;
    }
    serde_json::from_value(value).map_err(parse_err)
}
