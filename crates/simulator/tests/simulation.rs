//! End-to-end runs of the single-chain coordinator.

use powsim_simulator::{
    CollectingSink, FinalSummary, Phase, SimulationError, Simulator, SimulatorConfig,
    WorkloadConfig,
};
use powsim_simulation::Topology;
use powsim_types::{BlockId, MinerId, NodeIndex};
use std::time::Duration;

fn pinned_single_miner(blocks: u64) -> SimulatorConfig {
    SimulatorConfig::new()
        .with_miners(1, 1000.0)
        .with_difficulty(600_000.0)
        .with_target_block_time(Duration::from_secs(600))
        .with_blocks_limit(blocks)
}

fn run_collecting(config: SimulatorConfig) -> (FinalSummary, CollectingSink) {
    let mut sim = Simulator::with_sink(config, CollectingSink::new()).unwrap();
    let summary = sim.run().unwrap();
    (summary, sim.into_sink())
}

#[test]
fn test_single_miner_wins_every_round() {
    let (summary, sink) = run_collecting(pinned_single_miner(10).with_debug(true));

    assert_eq!(summary.total_blocks, 10);
    assert_eq!(sink.rounds.len(), 10);
    assert!(sink.rounds.iter().all(|r| r.miner == MinerId(0)));
    assert_eq!(summary.total_supply, 500.0);
    assert_eq!(summary.final_difficulty, 600_000.0);
    assert_eq!(summary.total_tx, 10);
    assert!(!summary.cancelled);
    assert!(summary.error.is_none());
}

#[test]
fn test_same_seed_same_run() {
    let config = SimulatorConfig::new()
        .with_miners(5, 200.0)
        .with_blocks_limit(20)
        .with_debug(true)
        .with_seed(7);

    let (first, first_sink) = run_collecting(config.clone());
    let (second, second_sink) = run_collecting(config);

    assert_eq!(first_sink.rounds, second_sink.rounds);
    assert_eq!(first.simulated_time, second.simulated_time);
    assert_eq!(first.messages, second.messages);
    assert_eq!(first.bytes_transferred, second.bytes_transferred);
}

#[test]
fn test_different_seeds_diverge() {
    let config = SimulatorConfig::new().with_miners(5, 200.0).with_blocks_limit(20);
    let (first, _) = run_collecting(config.clone().with_seed(1));
    let (second, _) = run_collecting(config.with_seed(2));
    assert_ne!(first.simulated_time, second.simulated_time);
}

#[test]
fn test_transaction_target_stops_the_run() {
    let workload = WorkloadConfig::new(5, 4, Duration::from_millis(1));
    let config = pinned_single_miner(100)
        .with_blocks_limit(100)
        .with_block_size(4)
        .with_workload(workload);
    // The limit is lowered to the blocks needed for the workload.
    assert_eq!(config.resolved_blocks_limit(), Some(5));

    let mut sim = Simulator::with_sink(config, CollectingSink::new()).unwrap();
    let summary = sim.run().unwrap();

    assert_eq!(summary.total_blocks, 5);
    assert_eq!(sim.stats().processed_tx, 20);
    assert_eq!(summary.total_tx, 25);
    assert_eq!(summary.mempool_depth, 0);
}

#[test]
fn test_fee_mode_credits_miners() {
    let workload = WorkloadConfig::new(10, 5, Duration::from_millis(10))
        .with_fees(true)
        .with_fee_rate(1, 100);
    let config = SimulatorConfig::new()
        .with_miners(3, 1000.0)
        .with_block_size(10)
        .with_workload(workload);

    let (summary, sink) = run_collecting(config);

    assert_eq!(sink.balances.len(), 1);
    let credited: f64 = sink.balances[0].iter().map(|b| b.balance).sum();
    let expected = summary.total_supply + summary.total_fees;
    assert!((credited - expected).abs() < 1e-9);
    assert!(summary.total_fees > 0.0);
}

#[test]
fn test_no_balances_without_fees() {
    let (_, sink) = run_collecting(pinned_single_miner(3));
    assert!(sink.balances.is_empty());
}

#[test]
fn test_line_topology_counts_one_message_per_forward() {
    let topology = Topology::line(5).unwrap();
    let config = pinned_single_miner(3).with_nodes(5, 1);
    let mut sim = Simulator::with_topology(config, topology, CollectingSink::new()).unwrap();
    let summary = sim.run().unwrap();

    // Every node but the tail forwards each block it accepts exactly once.
    let forwards: usize = (1..=3)
        .map(|id| {
            sim.network()
                .nodes()
                .iter()
                .filter(|n| n.has_seen(BlockId(id)) && n.index() != NodeIndex(4))
                .count()
        })
        .sum();
    assert_eq!(summary.messages, forwards as u64);
}

#[test]
fn test_cancelled_run_still_reports() {
    let mut sim = Simulator::with_sink(pinned_single_miner(1000), CollectingSink::new()).unwrap();
    sim.cancel_flag().cancel();

    let summary = sim.run().unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total_blocks, 0);
    assert_eq!(sim.phase(), Phase::Terminated);
    assert_eq!(sim.sink().finals.len(), 1);
    assert!(sim.sink().finals[0].cancelled);
}

#[test]
fn test_zero_wall_budget_cancels() {
    let config = pinned_single_miner(1000).with_max_wall_time(Duration::ZERO);
    let (summary, _) = run_collecting(config);
    assert!(summary.cancelled);
}

#[test]
fn test_mining_fault_reports_before_failing() {
    let config = SimulatorConfig::new()
        .with_miners(1, 1.0)
        .with_difficulty(1e30)
        .with_blocks_limit(10);
    let mut sim = Simulator::with_sink(config, CollectingSink::new()).unwrap();

    let result = sim.run();

    assert!(matches!(result, Err(SimulationError::Mining(_))));
    let finals = &sim.sink().finals;
    assert_eq!(finals.len(), 1);
    assert!(finals[0].error.is_some());
    assert!(!finals[0].cancelled);
    assert_eq!(sim.phase(), Phase::Terminated);
}

#[test]
fn test_config_errors_surface_before_running() {
    let config = SimulatorConfig::new().with_nodes(3, 3).with_blocks_limit(1);
    assert!(matches!(
        Simulator::new(config),
        Err(SimulationError::Config(_))
    ));
}
