//! Block propagation over the node graph.

use crate::{LatencyModel, NetworkConfig, Scheduler, Topology};
use powsim_core::{Action, Event, RunStatistics, StateMachine};
use powsim_node::GossipNode;
use powsim_types::{Block, BlockId, NodeIndex, ShardId};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// A node accepted a block for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Accepting node.
    pub node: NodeIndex,
    /// Accepted block.
    pub block: BlockId,
    /// Hops from the entry node.
    pub hops: u32,
    /// Time from block creation to acceptance.
    pub latency: Duration,
}

/// All nodes plus the latency model that connects them.
#[derive(Debug)]
pub struct GossipNetwork {
    nodes: Vec<GossipNode>,
    latency: LatencyModel,
}

impl GossipNetwork {
    /// Network over already-built nodes.
    pub fn new(nodes: Vec<GossipNode>, latency: LatencyModel) -> Self {
        Self { nodes, latency }
    }

    /// Place `count` unconnected nodes at random cities and link speeds.
    pub fn place(config: &NetworkConfig, count: u32, rng: &mut impl Rng) -> Vec<GossipNode> {
        (0..count)
            .map(|i| GossipNode::new(NodeIndex(i), config.sample_profile(rng)))
            .collect()
    }

    /// Place nodes and wire them with `topology`.
    pub fn build(
        config: NetworkConfig,
        topology: Topology,
        target_block_time: Duration,
        rng: &mut impl Rng,
    ) -> Self {
        let nodes = Self::place(&config, topology.len() as u32, rng);
        let mut network = Self::new(nodes, LatencyModel::new(config, target_block_time));
        network.connect(topology);
        network
    }

    /// Replace every node's neighbor list.
    pub fn connect(&mut self, topology: Topology) {
        for (node, neighbors) in self.nodes.iter_mut().zip(topology.into_adjacency()) {
            node.set_neighbors(neighbors);
        }
    }

    /// Tag nodes with the shard they belong to.
    pub fn assign_shards(&mut self, shards: &[Vec<NodeIndex>]) {
        for (shard, members) in shards.iter().enumerate() {
            for member in members {
                if let Some(node) = self.nodes.get_mut(member.as_usize()) {
                    node.set_shard(ShardId(shard as u32));
                }
            }
        }
    }

    /// Node by index.
    pub fn node(&self, index: NodeIndex) -> Option<&GossipNode> {
        self.nodes.get(index.as_usize())
    }

    /// All nodes.
    pub fn nodes(&self) -> &[GossipNode] {
        &self.nodes
    }

    /// Node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the network has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes and latency model together, for sharding.
    pub fn split_mut(&mut self) -> (&[GossipNode], &mut LatencyModel) {
        (&self.nodes, &mut self.latency)
    }

    /// Uniformly random node.
    pub fn random_node(&self, rng: &mut impl Rng) -> NodeIndex {
        NodeIndex(rng.gen_range(0..self.nodes.len().max(1)) as u32)
    }

    /// Number of nodes that have accepted `block`.
    pub fn coverage(&self, block: BlockId) -> usize {
        self.nodes.iter().filter(|n| n.has_seen(block)).count()
    }

    /// Hand a freshly mined block to its entry node. Not counted as a
    /// message.
    pub fn inject(&self, scheduler: &mut Scheduler<Event>, entry: NodeIndex, block: Arc<Block>) {
        trace!(block = %block.id, %entry, "Injecting block");
        scheduler.delay(
            Duration::ZERO,
            Event::BlockDelivered {
                node: entry,
                block,
                hops: 0,
            },
        );
    }

    /// Deliver a block to `node` and schedule its forwards.
    ///
    /// Returns the acceptance if this was the node's first copy. Every
    /// forward is counted in `stats` when it is sent.
    pub fn deliver(
        &mut self,
        scheduler: &mut Scheduler<Event>,
        stats: &mut RunStatistics,
        rng: &mut impl Rng,
        node: NodeIndex,
        block: Arc<Block>,
        hops: u32,
    ) -> Option<Delivery> {
        let now = scheduler.now();
        let Some(target) = self.nodes.get_mut(node.as_usize()) else {
            warn!(%node, "Delivery to unknown node dropped");
            return None;
        };
        target.set_time(now);
        let created_at = block.created_at;
        let actions = target.handle(Event::BlockDelivered { node, block, hops });

        let mut accepted = None;
        for action in actions {
            match action {
                Action::BlockAccepted { node, block, hops } => {
                    accepted = Some(Delivery {
                        node,
                        block,
                        hops,
                        latency: now.saturating_sub(created_at),
                    });
                }
                Action::ForwardBlock { from, to, block, hops } => {
                    let (Some(sender), Some(receiver)) =
                        (self.nodes.get(from.as_usize()), self.nodes.get(to.as_usize()))
                    else {
                        warn!(%from, %to, "Forward to unknown node dropped");
                        continue;
                    };
                    let size = block.size();
                    let delay = self.latency.delivery_delay(sender, receiver, size, rng);
                    stats.record_send(size);
                    scheduler.delay(delay, Event::BlockDelivered { node: to, block, hops });
                }
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powsim_test_helpers::{line_adjacency, test_block};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn run_to_idle(
        network: &mut GossipNetwork,
        scheduler: &mut Scheduler<Event>,
        stats: &mut RunStatistics,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Some((_, event)) = scheduler.next() {
            if let Event::BlockDelivered { node, block, hops } = event {
                deliveries.extend(network.deliver(scheduler, stats, rng, node, block, hops));
            }
        }
        deliveries
    }

    #[test]
    fn test_line_propagation_reaches_end_in_four_hops() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let topology = Topology::from_adjacency(line_adjacency(5)).unwrap();
        let mut network = GossipNetwork::build(
            NetworkConfig::default(),
            topology,
            Duration::from_secs(600),
            &mut rng,
        );
        let mut scheduler = Scheduler::new();
        let mut stats = RunStatistics::new();

        let block = test_block(1, 1);
        let size = block.size();
        network.inject(&mut scheduler, NodeIndex(0), block);
        let deliveries = run_to_idle(&mut network, &mut scheduler, &mut stats, &mut rng);

        assert_eq!(deliveries.len(), 5);
        let last = deliveries.last().unwrap();
        assert_eq!(last.node, NodeIndex(4));
        assert_eq!(last.hops, 4);
        assert_eq!(stats.messages, 4);
        assert_eq!(stats.bytes_transferred, 4 * size);
        assert_eq!(network.coverage(BlockId(1)), 5);
    }

    #[test]
    fn test_redundant_paths_deliver_each_node_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let topology = Topology::random(12, 4, &mut rng).unwrap();
        let mut network = GossipNetwork::build(
            NetworkConfig::default(),
            topology,
            Duration::from_secs(600),
            &mut rng,
        );
        let mut scheduler = Scheduler::new();
        let mut stats = RunStatistics::new();

        network.inject(&mut scheduler, NodeIndex(3), test_block(9, 1));
        let deliveries = run_to_idle(&mut network, &mut scheduler, &mut stats, &mut rng);

        let accepted = deliveries.len();
        assert_eq!(accepted, network.coverage(BlockId(9)));
        // Every accepting node forwards to all 4 neighbors exactly once.
        assert_eq!(stats.messages, 4 * accepted as u64);

        // A second copy changes nothing.
        let before = stats.clone();
        network.inject(&mut scheduler, NodeIndex(3), test_block(9, 1));
        let again = run_to_idle(&mut network, &mut scheduler, &mut stats, &mut rng);
        assert!(again.is_empty());
        assert_eq!(stats, before);
    }

    #[test]
    fn test_delivery_delays_respect_cap() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = NetworkConfig::default().with_max_delay_fraction(0.25);
        let topology = Topology::random(8, 3, &mut rng).unwrap();
        let mut network = GossipNetwork::build(config, topology, Duration::from_millis(100), &mut rng);
        let mut scheduler = Scheduler::new();
        let mut stats = RunStatistics::new();

        network.inject(&mut scheduler, NodeIndex(0), test_block(1, 4000));
        let deliveries = run_to_idle(&mut network, &mut scheduler, &mut stats, &mut rng);
        for delivery in deliveries {
            assert!(delivery.latency <= Duration::from_millis(25) * delivery.hops);
        }
    }
}
