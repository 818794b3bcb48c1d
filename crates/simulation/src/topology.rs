//! Neighbor graphs and latency-based sharding.

use crate::LatencyModel;
use powsim_node::GossipNode;
use powsim_types::NodeIndex;
use rand::seq::index;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors building a topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Topology has no nodes.
    #[error("topology needs at least one node")]
    Empty,

    /// Each node cannot list that many distinct neighbors.
    #[error("neighbor count {neighbors} must be less than node count {nodes}")]
    TooManyNeighbors {
        /// Requested out-degree.
        neighbors: u32,
        /// Node count.
        nodes: u32,
    },

    /// Adjacency refers to a node that does not exist.
    #[error("node {node} lists unknown neighbor {neighbor}")]
    UnknownNeighbor {
        /// Listing node.
        node: u32,
        /// Missing neighbor.
        neighbor: u32,
    },

    /// Adjacency contains a self loop.
    #[error("node {0} lists itself as a neighbor")]
    SelfLoop(u32),
}

/// Directed neighbor lists, one per node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    adjacency: Vec<Vec<NodeIndex>>,
}

impl Topology {
    /// Every node picks `neighbors` distinct other nodes uniformly at random.
    pub fn random(nodes: u32, neighbors: u32, rng: &mut impl Rng) -> Result<Self, TopologyError> {
        if nodes == 0 {
            return Err(TopologyError::Empty);
        }
        if neighbors >= nodes {
            return Err(TopologyError::TooManyNeighbors { neighbors, nodes });
        }
        let members: Vec<NodeIndex> = (0..nodes).map(NodeIndex).collect();
        let adjacency = members
            .iter()
            .map(|&node| sample_peers(&members, node, neighbors as usize, rng))
            .collect();
        Ok(Self { adjacency })
    }

    /// Random neighbors drawn only from within each group. Groups with
    /// fewer members than `neighbors + 1` connect every member to all others.
    pub fn random_within(
        nodes: u32,
        groups: &[Vec<NodeIndex>],
        neighbors: u32,
        rng: &mut impl Rng,
    ) -> Result<Self, TopologyError> {
        if nodes == 0 {
            return Err(TopologyError::Empty);
        }
        let mut adjacency = vec![Vec::new(); nodes as usize];
        for group in groups {
            for &node in group {
                let slot = adjacency
                    .get_mut(node.as_usize())
                    .ok_or(TopologyError::UnknownNeighbor { node: node.0, neighbor: node.0 })?;
                *slot = sample_peers(group, node, neighbors as usize, rng);
            }
        }
        Ok(Self { adjacency })
    }

    /// Directed line: node `i` forwards only to node `i + 1`.
    pub fn line(nodes: u32) -> Result<Self, TopologyError> {
        if nodes == 0 {
            return Err(TopologyError::Empty);
        }
        let adjacency = (0..nodes)
            .map(|i| if i + 1 < nodes { vec![NodeIndex(i + 1)] } else { vec![] })
            .collect();
        Ok(Self { adjacency })
    }

    /// Explicit adjacency lists, validated.
    pub fn from_adjacency(adjacency: Vec<Vec<u32>>) -> Result<Self, TopologyError> {
        if adjacency.is_empty() {
            return Err(TopologyError::Empty);
        }
        let nodes = adjacency.len() as u32;
        for (node, neighbors) in adjacency.iter().enumerate() {
            let node = node as u32;
            for &neighbor in neighbors {
                if neighbor == node {
                    return Err(TopologyError::SelfLoop(node));
                }
                if neighbor >= nodes {
                    return Err(TopologyError::UnknownNeighbor { node, neighbor });
                }
            }
        }
        Ok(Self {
            adjacency: adjacency
                .into_iter()
                .map(|list| list.into_iter().map(NodeIndex).collect())
                .collect(),
        })
    }

    /// Node count.
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Whether the topology has no nodes.
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Outgoing neighbors of `node`.
    pub fn neighbors(&self, node: NodeIndex) -> &[NodeIndex] {
        self.adjacency
            .get(node.as_usize())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Consume into per-node neighbor lists.
    pub fn into_adjacency(self) -> Vec<Vec<NodeIndex>> {
        self.adjacency
    }
}

fn sample_peers(
    members: &[NodeIndex],
    node: NodeIndex,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<NodeIndex> {
    let others: Vec<NodeIndex> = members.iter().copied().filter(|&m| m != node).collect();
    let count = count.min(others.len());
    index::sample(rng, others.len(), count)
        .into_iter()
        .map(|i| others[i])
        .collect()
}

/// Group nodes into shards by worst-case link latency.
///
/// Greedy in node-index order: the lowest unassigned node seeds a shard and
/// pulls in every unassigned node within `max_latency` of it.
pub fn shard_by_latency(
    nodes: &[GossipNode],
    latency: &mut LatencyModel,
    max_latency: Duration,
) -> Vec<Vec<NodeIndex>> {
    let mut assigned = vec![false; nodes.len()];
    let mut shards = Vec::new();

    for seed in 0..nodes.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut shard = vec![nodes[seed].index()];
        for other in seed + 1..nodes.len() {
            if !assigned[other] && latency.worst_case_latency(&nodes[seed], &nodes[other]) <= max_latency {
                assigned[other] = true;
                shard.push(nodes[other].index());
            }
        }
        shards.push(shard);
    }

    debug!(shards = shards.len(), nodes = nodes.len(), "Sharded nodes by latency");
    shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NetworkConfig;
    use powsim_node::NodeProfile;
    use powsim_types::GeoPoint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;
    use tracing_test::traced_test;

    #[test]
    fn test_random_topology_has_k_distinct_non_self_neighbors() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let topology = Topology::random(20, 4, &mut rng).unwrap();
        assert_eq!(topology.len(), 20);
        for i in 0..20 {
            let neighbors = topology.neighbors(NodeIndex(i));
            assert_eq!(neighbors.len(), 4);
            assert!(!neighbors.contains(&NodeIndex(i)));
            let unique: HashSet<_> = neighbors.iter().collect();
            assert_eq!(unique.len(), 4);
        }
    }

    #[test]
    fn test_random_topology_is_seeded() {
        let a = Topology::random(10, 3, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let b = Topology::random(10, 3, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_topology_rejects_bad_sizes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(Topology::random(0, 0, &mut rng), Err(TopologyError::Empty));
        assert_eq!(
            Topology::random(3, 3, &mut rng),
            Err(TopologyError::TooManyNeighbors { neighbors: 3, nodes: 3 })
        );
        assert!(Topology::random(1, 0, &mut rng).is_ok());
    }

    #[test]
    fn test_line_is_directed() {
        let line = Topology::line(5).unwrap();
        assert_eq!(line.neighbors(NodeIndex(0)), &[NodeIndex(1)]);
        assert_eq!(line.neighbors(NodeIndex(3)), &[NodeIndex(4)]);
        assert!(line.neighbors(NodeIndex(4)).is_empty());
    }

    #[test]
    fn test_explicit_adjacency_is_validated() {
        assert_eq!(
            Topology::from_adjacency(vec![vec![1], vec![1]]),
            Err(TopologyError::SelfLoop(1))
        );
        assert_eq!(
            Topology::from_adjacency(vec![vec![2], vec![]]),
            Err(TopologyError::UnknownNeighbor { node: 0, neighbor: 2 })
        );
        let ok = Topology::from_adjacency(vec![vec![1, 2], vec![0], vec![]]).unwrap();
        assert_eq!(ok.neighbors(NodeIndex(0)), &[NodeIndex(1), NodeIndex(2)]);
    }

    #[test]
    fn test_random_within_stays_inside_groups() {
        let groups = vec![
            vec![NodeIndex(0), NodeIndex(2), NodeIndex(4)],
            vec![NodeIndex(1), NodeIndex(3)],
        ];
        let topology =
            Topology::random_within(5, &groups, 5, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        for group in &groups {
            for node in group {
                let neighbors = topology.neighbors(*node);
                assert_eq!(neighbors.len(), group.len() - 1);
                assert!(neighbors.iter().all(|n| group.contains(n)));
            }
        }
    }

    fn node_at(index: u32, lat: f64, lon: f64) -> GossipNode {
        GossipNode::new(
            NodeIndex(index),
            NodeProfile {
                location: format!("node-{index}"),
                point: GeoPoint::new(lat, lon),
                bandwidth: 1e7,
            },
        )
    }

    #[test]
    fn test_shard_by_latency_groups_nearby_nodes() {
        let nodes = vec![
            node_at(0, 51.51, -0.13),  // London
            node_at(1, 35.68, 139.69), // Tokyo
            node_at(2, 50.11, 8.68),   // Frankfurt
            node_at(3, 37.56, 126.98), // Seoul
        ];
        let mut latency = LatencyModel::new(NetworkConfig::default(), Duration::from_secs(600));
        let shards = shard_by_latency(&nodes, &mut latency, Duration::from_millis(20));
        assert_eq!(
            shards,
            vec![vec![NodeIndex(0), NodeIndex(2)], vec![NodeIndex(1), NodeIndex(3)]]
        );
    }

    #[traced_test]
    #[test]
    fn test_generous_threshold_yields_single_shard() {
        let nodes: Vec<_> = (0..6).map(|i| node_at(i, 0.0, f64::from(i) * 30.0)).collect();
        let mut latency = LatencyModel::new(NetworkConfig::default(), Duration::from_secs(600));
        let shards = shard_by_latency(&nodes, &mut latency, Duration::from_secs(1));
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].len(), 6);
        assert!(logs_contain("Sharded nodes by latency"));
    }
}
