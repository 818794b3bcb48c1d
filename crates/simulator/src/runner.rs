//! Single-chain coordinator.

use crate::cancel::CancelFlag;
use crate::config::SimulatorConfig;
use crate::error::SimulationError;
use crate::ledger::{Ledger, Termination};
use crate::metrics::{
    ChainSnapshot, FinalSummary, MetricsCollector, ReportSink, RoundRecord, TracingSink,
};
use crate::wallets::Wallets;
use powsim_core::{Event, RunStatistics};
use powsim_mining::{
    sample_attempt_delays, DifficultyController, MiningRace, RaceOutcome, RetargetOutcome,
    RewardSchedule,
};
use powsim_simulation::{GossipNetwork, Scheduler, Topology};
use powsim_types::{total_hashrate, Block, BlockId, Miner, MinerId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Built, not yet run.
    Init,
    /// Mining rounds in progress.
    Round,
    /// Finished, cancelled, or aborted.
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Completed,
    Cancelled,
}

/// Build the difficulty controller for a chain with `hashrate`.
pub(crate) fn difficulty_for(config: &SimulatorConfig, hashrate: f64) -> DifficultyController {
    match config.difficulty {
        Some(difficulty) => DifficultyController::pinned(config.target_block_time, difficulty),
        None => DifficultyController::new(config.target_block_time, hashrate),
    }
}

/// Log a retarget that changed something.
pub(crate) fn log_retarget(outcome: RetargetOutcome, chain: &str) {
    if let RetargetOutcome::Adjusted { previous, current, factor } = outcome {
        info!(chain, previous, current, factor, "Difficulty adjusted");
    }
}

/// Whether the run should stop for cancellation or wall-clock budget.
pub(crate) fn should_cancel(cancel: &CancelFlag, budget: Option<Duration>, started: Instant) -> bool {
    cancel.is_cancelled() || budget.is_some_and(|budget| started.elapsed() >= budget)
}

/// Runs one proof-of-work chain over a gossip network.
///
/// Each round the coordinator checks difficulty, races every miner, seals
/// the winner's block from the mempool, mints the subsidy, and hands the
/// block to a random node. Wallet submissions and gossip deliveries are
/// processed between rounds in virtual-time order.
pub struct Simulator<S: ReportSink = TracingSink> {
    config: SimulatorConfig,
    rng: ChaCha8Rng,
    scheduler: Scheduler<Event>,
    network: GossipNetwork,
    miners: Vec<Miner>,
    total_hashrate: f64,
    wallets: Wallets,
    ledger: Ledger,
    difficulty: DifficultyController,
    rewards: RewardSchedule,
    metrics: MetricsCollector,
    termination: Termination,
    sink: S,
    cancel: CancelFlag,
    phase: Phase,
    blocks: u64,
    round: u64,
    race: Option<MiningRace>,
    last_block_at: Duration,
}

impl Simulator<TracingSink> {
    /// Simulator that logs its reports.
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulationError> {
        Self::with_sink(config, TracingSink)
    }
}

impl<S: ReportSink> Simulator<S> {
    /// Simulator over a random k-out topology, reporting to `sink`.
    pub fn with_sink(config: SimulatorConfig, sink: S) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let topology = Topology::random(config.nodes, config.neighbors, &mut rng)?;
        Self::build(config, topology, sink, rng)
    }

    /// Simulator over an explicit topology. The node count follows the
    /// topology.
    pub fn with_topology(
        mut config: SimulatorConfig,
        topology: Topology,
        sink: S,
    ) -> Result<Self, SimulationError> {
        config.nodes = topology.len() as u32;
        config.neighbors = config.neighbors.min(config.nodes.saturating_sub(1));
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::build(config, topology, sink, rng)
    }

    fn build(
        config: SimulatorConfig,
        topology: Topology,
        sink: S,
        mut rng: ChaCha8Rng,
    ) -> Result<Self, SimulationError> {
        if config.sharding.enabled {
            warn!("Sharding is enabled but a single-chain simulator was requested");
        }
        let network = GossipNetwork::build(
            config.network.clone(),
            topology,
            config.target_block_time,
            &mut rng,
        );
        let miners: Vec<Miner> = (0..config.miners)
            .map(|i| Miner::new(MinerId(i), config.hashrate))
            .collect();
        let total_hashrate = total_hashrate(&miners);

        Ok(Self {
            rng,
            scheduler: Scheduler::new(),
            network,
            total_hashrate,
            wallets: Wallets::from_config(&config.workload),
            ledger: Ledger::new(&config),
            difficulty: difficulty_for(&config, total_hashrate),
            rewards: RewardSchedule::new(config.initial_reward, config.halving_interval),
            metrics: MetricsCollector::new()?,
            termination: Termination::new(&config),
            miners,
            sink,
            cancel: CancelFlag::new(),
            phase: Phase::Init,
            blocks: 0,
            round: 0,
            race: None,
            last_block_at: Duration::ZERO,
            config,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Flag that cancels this run when set from anywhere.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Report sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the simulator, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run configuration.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> &RunStatistics {
        &self.ledger.stats
    }

    /// Blocks accepted so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Current difficulty.
    pub fn difficulty(&self) -> f64 {
        self.difficulty.difficulty()
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Transactions waiting in the mempool.
    pub fn mempool_depth(&self) -> usize {
        self.ledger.mempool.len()
    }

    /// Gossip network.
    pub fn network(&self) -> &GossipNetwork {
        &self.network
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Run loop
    // ═══════════════════════════════════════════════════════════════════════

    /// Run until a termination condition, cancellation, or error.
    ///
    /// The final summary is delivered to the sink in every case, before any
    /// error is returned.
    pub fn run(&mut self) -> Result<FinalSummary, SimulationError> {
        let started = Instant::now();
        let result = self.run_loop(started);
        self.phase = Phase::Terminated;

        let (cancelled, error) = match &result {
            Ok(exit) => (*exit == Exit::Cancelled, None),
            Err(e) => (false, Some(e.to_string())),
        };
        let summary = self.final_summary(started.elapsed(), cancelled, error);
        self.sink.on_final(&summary);
        if let Some(balances) = self.ledger.balances() {
            self.sink.on_balances(&balances);
        }
        result.map(|_| summary)
    }

    fn run_loop(&mut self, started: Instant) -> Result<Exit, SimulationError> {
        if self.phase == Phase::Init {
            info!(
                nodes = self.config.nodes,
                miners = self.miners.len(),
                hashrate = self.total_hashrate,
                difficulty = self.difficulty.difficulty(),
                blocks_limit = ?self.termination.blocks_limit,
                seed = self.config.seed,
                "Starting simulation"
            );
            self.wallets.start(&mut self.scheduler);
            self.phase = Phase::Round;
            if self.termination.reached(0, 0) {
                self.phase = Phase::Terminated;
                return Ok(Exit::Completed);
            }
            self.start_round()?;
        }

        while self.phase == Phase::Round {
            if should_cancel(&self.cancel, self.config.max_wall_time, started) {
                info!(blocks = self.blocks, "Simulation cancelled");
                return Ok(Exit::Cancelled);
            }
            let Some((now, event)) = self.scheduler.next() else {
                return Err(SimulationError::Stalled {
                    now: self.scheduler.now(),
                });
            };
            self.handle(now, event)?;
        }
        Ok(Exit::Completed)
    }

    fn handle(&mut self, now: Duration, event: Event) -> Result<(), SimulationError> {
        match event {
            Event::WalletTick { wallet } => {
                self.wallets.on_tick(
                    wallet,
                    &mut self.scheduler,
                    &mut self.ledger.mempool,
                    &mut self.rng,
                );
            }
            Event::MiningAttemptFinished { round, miner, .. } => {
                let Some(race) = self.race.as_mut().filter(|r| r.round() == round) else {
                    trace!(round, %miner, "Attempt for a closed round ignored");
                    return Ok(());
                };
                if let Some(outcome) = race.finish(miner, now) {
                    self.race = None;
                    self.on_block_mined(outcome)?;
                }
            }
            Event::BlockDelivered { node, block, hops } => {
                let delivery = self.network.deliver(
                    &mut self.scheduler,
                    &mut self.ledger.stats,
                    &mut self.rng,
                    node,
                    block,
                    hops,
                );
                if let Some(delivery) = delivery {
                    self.metrics.record_propagation(delivery.latency);
                }
            }
            Event::ShardRoundJoined { round } => {
                trace!(round, "Shard join ignored by single-chain simulator");
            }
        }
        Ok(())
    }

    fn start_round(&mut self) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        self.round += 1;
        log_retarget(self.difficulty.check_retarget(now), "main");

        let round = self.round;
        let seed = self.rng.gen::<u64>();
        let delays = sample_attempt_delays(&self.miners, self.difficulty.difficulty(), seed)?;
        let branches = delays
            .into_iter()
            .map(|attempt| {
                (
                    attempt.delay,
                    Event::MiningAttemptFinished {
                        round,
                        miner: attempt.miner,
                        shard: None,
                    },
                )
            })
            .collect();
        self.scheduler.race(branches)?;
        self.race = Some(MiningRace::new(round, now, self.miners.len()));
        Ok(())
    }

    fn on_block_mined(&mut self, outcome: RaceOutcome) -> Result<(), SimulationError> {
        let now = outcome.finished_at;
        let round_duration = now.saturating_sub(self.last_block_at);
        self.last_block_at = now;
        self.blocks += 1;
        self.difficulty.on_block();

        let minted = self.rewards.mint(self.blocks);
        let block = Arc::new(self.ledger.seal(
            BlockId(self.blocks),
            outcome.miner,
            minted,
            round_duration,
            now,
        ));
        self.metrics.record_block_interval(round_duration);
        debug!(block = %block.id, miner = %outcome.miner, tx = block.tx_count, "Block mined");

        let entry = self.network.random_node(&mut self.rng);
        self.network.inject(&mut self.scheduler, entry, block.clone());
        self.report(&block);

        if self.termination.reached(self.blocks, self.ledger.stats.processed_tx) {
            self.phase = Phase::Terminated;
            return Ok(());
        }
        self.start_round()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reporting
    // ═══════════════════════════════════════════════════════════════════════

    fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            now: self.scheduler.now(),
            blocks: self.blocks,
            blocks_limit: self.termination.blocks_limit,
            difficulty: self.difficulty.difficulty(),
            total_hashrate: self.total_hashrate,
            mempool_depth: self.ledger.mempool.len(),
        }
    }

    fn report(&mut self, block: &Block) {
        if self.config.debug {
            let stats = &self.ledger.stats;
            let record = RoundRecord {
                time: self.scheduler.now(),
                block: block.id,
                miner: block.miner,
                shard: block.shard,
                round_duration: block.round_duration,
                difficulty: self.difficulty.difficulty(),
                total_hashrate: self.total_hashrate,
                cumulative_tx: stats.total_tx,
                cumulative_coins: stats.total_coins,
                mempool_depth: self.ledger.mempool.len(),
                cumulative_bytes: stats.bytes_transferred,
                cumulative_messages: stats.messages,
            };
            self.sink.on_round(&record);
        } else if self.blocks % self.config.print_interval == 0 {
            let snapshot = self.snapshot();
            let summary = self.metrics.checkpoint(snapshot, &self.ledger.stats);
            self.sink.on_periodic(&summary);
        }
    }

    fn final_summary(
        &self,
        wall_time: Duration,
        cancelled: bool,
        error: Option<String>,
    ) -> FinalSummary {
        let now = self.scheduler.now();
        let stats = &self.ledger.stats;
        summarize(
            now,
            self.blocks,
            self.termination.blocks_limit,
            stats,
            &self.metrics,
            SummaryExtras {
                final_difficulty: self.difficulty.difficulty(),
                total_hashrate: self.total_hashrate,
                mempool_depth: self.ledger.mempool.len(),
                shards: 1,
                wall_time,
                cancelled,
                error,
            },
        )
    }
}

/// Values of a final summary that vary between coordinators.
pub(crate) struct SummaryExtras {
    pub(crate) final_difficulty: f64,
    pub(crate) total_hashrate: f64,
    pub(crate) mempool_depth: usize,
    pub(crate) shards: usize,
    pub(crate) wall_time: Duration,
    pub(crate) cancelled: bool,
    pub(crate) error: Option<String>,
}

pub(crate) fn summarize(
    now: Duration,
    blocks: u64,
    blocks_limit: Option<u64>,
    stats: &RunStatistics,
    metrics: &MetricsCollector,
    extras: SummaryExtras,
) -> FinalSummary {
    let secs = now.as_secs_f64();
    FinalSummary {
        total_blocks: blocks,
        blocks_limit,
        avg_block_time: if blocks > 0 { secs / blocks as f64 } else { 0.0 },
        median_block_time: metrics.median_block_interval(),
        tps: if secs > 0.0 { stats.total_tx as f64 / secs } else { 0.0 },
        annualized_inflation: metrics.inflation_since_checkpoint(now, stats),
        final_difficulty: extras.final_difficulty,
        total_hashrate: extras.total_hashrate,
        total_supply: stats.total_coins,
        total_tx: stats.total_tx,
        total_fees: stats.total_fees,
        mempool_depth: extras.mempool_depth,
        bytes_transferred: stats.bytes_transferred,
        messages: stats.messages,
        simulated_time: now,
        wall_time: extras.wall_time,
        shards: extras.shards,
        cancelled: extras.cancelled,
        error: extras.error,
        propagation: metrics.propagation_percentiles(),
    }
}
