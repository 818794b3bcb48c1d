//! Sharded coordinator: one chain per latency cluster.

use crate::cancel::CancelFlag;
use crate::config::SimulatorConfig;
use crate::error::SimulationError;
use crate::ledger::{Ledger, Termination};
use crate::metrics::{
    ChainSnapshot, FinalSummary, MetricsCollector, ReportSink, RoundRecord, TracingSink,
};
use crate::runner::{
    difficulty_for, log_retarget, should_cancel, summarize, Exit, Phase, SummaryExtras,
};
use crate::wallets::Wallets;
use powsim_core::{Event, RunStatistics};
use powsim_mining::{
    fastest, sample_attempt_delays, DifficultyController, MiningRace, RaceOutcome,
    RewardSchedule,
};
use powsim_simulation::{shard_by_latency, GossipNetwork, LatencyModel, Scheduler, Topology};
use powsim_types::{total_hashrate, Block, BlockId, Miner, MinerId, NodeIndex, ShardId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Independent chain state of one shard.
#[derive(Debug)]
pub struct ShardChain {
    id: ShardId,
    nodes: Vec<NodeIndex>,
    miners: Vec<Miner>,
    hashrate: f64,
    difficulty: DifficultyController,
    rewards: RewardSchedule,
    blocks: u64,
    last_block_at: Duration,
    race: Option<MiningRace>,
    winner: Option<RaceOutcome>,
}

impl ShardChain {
    fn new(id: ShardId, nodes: Vec<NodeIndex>, miners: Vec<Miner>, config: &SimulatorConfig) -> Self {
        let hashrate = total_hashrate(&miners);
        Self {
            id,
            nodes,
            difficulty: difficulty_for(config, hashrate),
            rewards: RewardSchedule::new(config.initial_reward, config.halving_interval),
            miners,
            hashrate,
            blocks: 0,
            last_block_at: Duration::ZERO,
            race: None,
            winner: None,
        }
    }

    /// Shard id.
    pub fn id(&self) -> ShardId {
        self.id
    }

    /// Member nodes.
    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    /// Miners working on this shard.
    pub fn miners(&self) -> &[Miner] {
        &self.miners
    }

    /// Blocks accepted on this shard.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Current shard difficulty.
    pub fn difficulty(&self) -> f64 {
        self.difficulty.difficulty()
    }
}

/// Split `miner_count` miners over `shards`: miner `i` seeds shard `i`,
/// the rest land on random shards. Every shard gets at least one miner,
/// so the result has `max(miner_count, shards)` miners.
pub(crate) fn assign_miners(
    miner_count: u32,
    hashrate: f64,
    shards: usize,
    rng: &mut impl Rng,
) -> Vec<Vec<Miner>> {
    let mut assignment = vec![Vec::new(); shards];
    if shards == 0 {
        return assignment;
    }
    let total = (miner_count as usize).max(shards);
    for i in 0..total {
        let shard = if i < shards { i } else { rng.gen_range(0..shards) };
        assignment[shard].push(Miner::new(MinerId(i as u32), hashrate).on_shard(ShardId(shard as u32)));
    }
    assignment
}

/// Runs one chain per shard under a shared global block ceiling.
///
/// Every global round races all shards at once and waits for the slowest
/// shard's winner. The finalizer then accepts the shard blocks in ascending
/// winner id until the ceiling is reached; blocks past the ceiling are
/// dropped.
pub struct ShardedSimulator<S: ReportSink = TracingSink> {
    config: SimulatorConfig,
    rng: ChaCha8Rng,
    scheduler: Scheduler<Event>,
    network: GossipNetwork,
    shards: Vec<ShardChain>,
    total_hashrate: f64,
    wallets: Wallets,
    ledger: Ledger,
    metrics: MetricsCollector,
    termination: Termination,
    sink: S,
    cancel: CancelFlag,
    phase: Phase,
    blocks: u64,
    round: u64,
}

impl ShardedSimulator<TracingSink> {
    /// Sharded simulator that logs its reports.
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulationError> {
        Self::with_sink(config, TracingSink)
    }
}

impl<S: ReportSink> ShardedSimulator<S> {
    /// Sharded simulator reporting to `sink`.
    pub fn with_sink(config: SimulatorConfig, sink: S) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let nodes = GossipNetwork::place(&config.network, config.nodes, &mut rng);
        let latency = LatencyModel::new(config.network.clone(), config.target_block_time);
        let mut network = GossipNetwork::new(nodes, latency);
        let groups = {
            let (nodes, latency) = network.split_mut();
            shard_by_latency(nodes, latency, config.sharding.max_latency)
        };
        let topology = Topology::random_within(config.nodes, &groups, config.neighbors, &mut rng)?;
        network.connect(topology);
        network.assign_shards(&groups);

        let miners = assign_miners(config.miners, config.hashrate, groups.len(), &mut rng);
        let shards: Vec<ShardChain> = groups
            .into_iter()
            .zip(miners)
            .enumerate()
            .map(|(i, (nodes, miners))| ShardChain::new(ShardId(i as u32), nodes, miners, &config))
            .collect();
        let total_hashrate = shards.iter().map(|s| s.hashrate).sum();

        for shard in &shards {
            debug!(
                shard = %shard.id,
                nodes = shard.nodes.len(),
                miners = shard.miners.len(),
                difficulty = shard.difficulty.difficulty(),
                "Shard configured"
            );
        }

        Ok(Self {
            rng,
            scheduler: Scheduler::new(),
            network,
            shards,
            total_hashrate,
            wallets: Wallets::from_config(&config.workload),
            ledger: Ledger::new(&config),
            metrics: MetricsCollector::new()?,
            termination: Termination::new(&config),
            sink,
            cancel: CancelFlag::new(),
            phase: Phase::Init,
            blocks: 0,
            round: 0,
            config,
        })
    }

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

    /// Per-shard chains.
    pub fn shards(&self) -> &[ShardChain] {
        &self.shards
    }

    /// Blocks accepted across all shards.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> &RunStatistics {
        &self.ledger.stats
    }

    /// Gossip network.
    pub fn network(&self) -> &GossipNetwork {
        &self.network
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Mean difficulty across shards.
    pub fn mean_difficulty(&self) -> f64 {
        if self.shards.is_empty() {
            return 0.0;
        }
        self.shards.iter().map(ShardChain::difficulty).sum::<f64>() / self.shards.len() as f64
    }

    /// Run until the global ceiling, the transaction target, cancellation,
    /// or an error. The final summary always reaches the sink.
    pub fn run(&mut self) -> Result<FinalSummary, SimulationError> {
        let started = Instant::now();
        let result = self.run_loop(started);
        self.phase = Phase::Terminated;

        let (cancelled, error) = match &result {
            Ok(exit) => (*exit == Exit::Cancelled, None),
            Err(e) => (false, Some(e.to_string())),
        };
        let summary = summarize(
            self.scheduler.now(),
            self.blocks,
            self.termination.blocks_limit,
            &self.ledger.stats,
            &self.metrics,
            SummaryExtras {
                final_difficulty: self.mean_difficulty(),
                total_hashrate: self.total_hashrate,
                mempool_depth: self.ledger.mempool.len(),
                shards: self.shards.len(),
                wall_time: started.elapsed(),
                cancelled,
                error,
            },
        );
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
                shards = self.shards.len(),
                hashrate = self.total_hashrate,
                blocks_limit = ?self.termination.blocks_limit,
                seed = self.config.seed,
                "Starting sharded simulation"
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
            Event::MiningAttemptFinished { round, miner, shard } => {
                let Some(chain) = shard.and_then(|s| self.shards.get_mut(s.0 as usize)) else {
                    trace!(round, %miner, "Attempt without a shard ignored");
                    return Ok(());
                };
                let Some(race) = chain.race.as_mut().filter(|r| r.round() == round) else {
                    return Ok(());
                };
                if let Some(outcome) = race.finish(miner, now) {
                    trace!(shard = %chain.id, %miner, "Shard race won");
                    chain.race = None;
                    chain.winner = Some(outcome);
                }
            }
            Event::ShardRoundJoined { round } if round == self.round => {
                self.finalize_round()?;
            }
            Event::ShardRoundJoined { round } => {
                trace!(round, "Stale shard join ignored");
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
        }
        Ok(())
    }

    fn start_round(&mut self) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        self.round += 1;
        let round = self.round;

        let mut fastest_delays = Vec::with_capacity(self.shards.len());
        for chain in &mut self.shards {
            log_retarget(chain.difficulty.check_retarget(now), "shard");
            let seed = self.rng.gen::<u64>();
            let delays = sample_attempt_delays(&chain.miners, chain.difficulty.difficulty(), seed)?;
            if let Some(best) = fastest(&delays) {
                fastest_delays.push(best.delay);
            }
            let shard = Some(chain.id);
            let branches = delays
                .into_iter()
                .map(|attempt| {
                    (
                        attempt.delay,
                        Event::MiningAttemptFinished {
                            round,
                            miner: attempt.miner,
                            shard,
                        },
                    )
                })
                .collect();
            self.scheduler.race(branches)?;
            chain.race = Some(MiningRace::new(round, now, chain.miners.len()));
            chain.winner = None;
        }
        self.scheduler
            .join(fastest_delays, Event::ShardRoundJoined { round });
        Ok(())
    }

    /// Accept shard winners in ascending miner id until the ceiling.
    fn finalize_round(&mut self) -> Result<(), SimulationError> {
        let mut winners: Vec<(usize, RaceOutcome)> = self
            .shards
            .iter_mut()
            .enumerate()
            .filter_map(|(i, chain)| chain.winner.take().map(|outcome| (i, outcome)))
            .collect();
        winners.sort_by_key(|(_, outcome)| outcome.miner);

        for (index, outcome) in winners {
            if self.termination.reached(self.blocks, self.ledger.stats.processed_tx) {
                trace!(miner = %outcome.miner, "Shard block past the ceiling dropped");
                continue;
            }
            self.accept(index, outcome);
        }

        if self.termination.reached(self.blocks, self.ledger.stats.processed_tx) {
            self.phase = Phase::Terminated;
            return Ok(());
        }
        self.start_round()
    }

    fn accept(&mut self, index: usize, outcome: RaceOutcome) {
        let now = self.scheduler.now();
        self.blocks += 1;
        let chain = &mut self.shards[index];
        chain.blocks += 1;
        chain.difficulty.on_block();
        let round_duration = outcome.finished_at.saturating_sub(chain.last_block_at);
        chain.last_block_at = outcome.finished_at;
        let minted = chain.rewards.mint(chain.blocks);
        let shard = chain.id;
        let entry = chain.nodes[self.rng.gen_range(0..chain.nodes.len())];

        let block = Arc::new(
            self.ledger
                .seal(BlockId(self.blocks), outcome.miner, minted, round_duration, now)
                .with_shard(shard),
        );
        self.metrics.record_block_interval(round_duration);
        debug!(block = %block.id, %shard, miner = %outcome.miner, tx = block.tx_count, "Shard block accepted");

        self.network.inject(&mut self.scheduler, entry, block.clone());
        self.report(&block, index);
    }

    fn report(&mut self, block: &Block, index: usize) {
        if self.config.debug {
            let stats = &self.ledger.stats;
            let chain = &self.shards[index];
            let record = RoundRecord {
                time: self.scheduler.now(),
                block: block.id,
                miner: block.miner,
                shard: block.shard,
                round_duration: block.round_duration,
                difficulty: chain.difficulty.difficulty(),
                total_hashrate: chain.hashrate,
                cumulative_tx: stats.total_tx,
                cumulative_coins: stats.total_coins,
                mempool_depth: self.ledger.mempool.len(),
                cumulative_bytes: stats.bytes_transferred,
                cumulative_messages: stats.messages,
            };
            self.sink.on_round(&record);
        } else if self.blocks % self.config.print_interval == 0 {
            let snapshot = ChainSnapshot {
                now: self.scheduler.now(),
                blocks: self.blocks,
                blocks_limit: self.termination.blocks_limit,
                difficulty: self.mean_difficulty(),
                total_hashrate: self.total_hashrate,
                mempool_depth: self.ledger.mempool.len(),
            };
            let summary = self.metrics.checkpoint(snapshot, &self.ledger.stats);
            self.sink.on_periodic(&summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_every_shard_gets_a_miner() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let miners = assign_miners(10, 5.0, 3, &mut rng);
        assert_eq!(miners.len(), 3);
        assert!(miners.iter().all(|m| !m.is_empty()));
        assert_eq!(miners.iter().map(Vec::len).sum::<usize>(), 10);
        for (shard, group) in miners.iter().enumerate() {
            assert!(group.iter().all(|m| m.shard == Some(ShardId(shard as u32))));
        }
    }

    #[test]
    fn test_more_shards_than_miners_adds_miners() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let miners = assign_miners(2, 5.0, 4, &mut rng);
        let ids: Vec<u32> = miners.iter().flatten().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
