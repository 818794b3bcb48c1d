//! Node state.

use powsim_core::{Action, Event, StateMachine};
use powsim_types::{Block, BlockId, GeoPoint, NodeIndex, ShardId};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Physical placement of a node, used by the latency model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeProfile {
    /// Name of the city the node sits in.
    pub location: String,
    /// Coordinates of that city.
    pub point: GeoPoint,
    /// Link bandwidth in bytes per second.
    pub bandwidth: f64,
}

/// A network participant that relays blocks.
///
/// The seen-set only grows: once a block is accepted it is never accepted
/// again, so every node forwards a block at most once.
#[derive(Debug, Clone)]
pub struct GossipNode {
    index: NodeIndex,
    profile: NodeProfile,
    shard: Option<ShardId>,
    neighbors: Vec<NodeIndex>,
    seen: HashSet<BlockId>,
    now: Duration,
}

impl GossipNode {
    /// Create a node with no neighbors.
    pub fn new(index: NodeIndex, profile: NodeProfile) -> Self {
        Self {
            index,
            profile,
            shard: None,
            neighbors: Vec::new(),
            seen: HashSet::new(),
            now: Duration::ZERO,
        }
    }

    /// Set the outgoing neighbor list.
    pub fn with_neighbors(mut self, neighbors: Vec<NodeIndex>) -> Self {
        self.set_neighbors(neighbors);
        self
    }

    /// Assign the node to a shard.
    pub fn with_shard(mut self, shard: ShardId) -> Self {
        self.set_shard(shard);
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Node index.
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Location and bandwidth.
    pub fn profile(&self) -> &NodeProfile {
        &self.profile
    }

    /// Shard membership, if sharded.
    pub fn shard(&self) -> Option<ShardId> {
        self.shard
    }

    /// Outgoing neighbors.
    pub fn neighbors(&self) -> &[NodeIndex] {
        &self.neighbors
    }

    /// Replace the outgoing neighbor list. Self-loops are dropped.
    pub fn set_neighbors(&mut self, neighbors: Vec<NodeIndex>) {
        let index = self.index;
        self.neighbors = neighbors.into_iter().filter(|n| *n != index).collect();
    }

    /// Move the node to a shard.
    pub fn set_shard(&mut self, shard: ShardId) {
        self.shard = Some(shard);
    }

    /// Whether the node has accepted `block`.
    pub fn has_seen(&self, block: BlockId) -> bool {
        self.seen.contains(&block)
    }

    /// Number of distinct blocks accepted.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Gossip
    // ═══════════════════════════════════════════════════════════════════════

    fn on_block_delivered(&mut self, block: Arc<Block>, hops: u32) -> Vec<Action> {
        if !self.seen.insert(block.id) {
            trace!(node = %self.index, block = %block.id, "Duplicate block dropped");
            return vec![];
        }

        trace!(
            node = %self.index,
            block = %block.id,
            hops,
            neighbors = self.neighbors.len(),
            "Block accepted"
        );

        let mut actions = Vec::with_capacity(self.neighbors.len() + 1);
        actions.push(Action::BlockAccepted {
            node: self.index,
            block: block.id,
            hops,
        });
        actions.extend(self.neighbors.iter().map(|&to| Action::ForwardBlock {
            from: self.index,
            to,
            block: block.clone(),
            hops: hops + 1,
        }));
        actions
    }
}

impl StateMachine for GossipNode {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::BlockDelivered { node, block, hops } => {
                if node != self.index {
                    warn!(node = %self.index, target = %node, "Delivery routed to wrong node");
                    return vec![];
                }
                self.on_block_delivered(block, hops)
            }
            other => {
                trace!(node = %self.index, event = other.type_name(), "Ignored event");
                vec![]
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powsim_test_helpers::test_block;
    use powsim_types::WalletId;

    fn profile() -> NodeProfile {
        NodeProfile {
            location: "Zurich".to_string(),
            point: GeoPoint::new(47.37, 8.54),
            bandwidth: 12_500_000.0,
        }
    }

    fn node_with(neighbors: &[u32]) -> GossipNode {
        GossipNode::new(NodeIndex(0), profile())
            .with_neighbors(neighbors.iter().map(|&n| NodeIndex(n)).collect())
    }

    fn deliver(node: &mut GossipNode, id: u64, hops: u32) -> Vec<Action> {
        node.handle(Event::BlockDelivered {
            node: node.index(),
            block: test_block(id, 1),
            hops,
        })
    }

    #[test]
    fn test_first_delivery_accepts_and_forwards() {
        let mut node = node_with(&[1, 2, 3]);
        let actions = deliver(&mut node, 7, 2);

        assert_eq!(actions.len(), 4);
        assert!(matches!(
            actions[0],
            Action::BlockAccepted { block: BlockId(7), hops: 2, .. }
        ));
        let targets: Vec<u32> = actions[1..]
            .iter()
            .map(|a| match a {
                Action::ForwardBlock { to, hops, .. } => {
                    assert_eq!(*hops, 3);
                    to.0
                }
                other => panic!("unexpected action {}", other.type_name()),
            })
            .collect();
        assert_eq!(targets, vec![1, 2, 3]);
        assert!(node.has_seen(BlockId(7)));
    }

    #[test]
    fn test_duplicate_delivery_produces_nothing() {
        let mut node = node_with(&[1, 2]);
        assert_eq!(deliver(&mut node, 1, 0).len(), 3);
        assert!(deliver(&mut node, 1, 5).is_empty());
        assert!(deliver(&mut node, 1, 1).is_empty());
        assert_eq!(node.seen_count(), 1);
    }

    #[test]
    fn test_seen_set_only_grows() {
        let mut node = node_with(&[]);
        for id in 0..10 {
            deliver(&mut node, id, 0);
            deliver(&mut node, id / 2, 0);
            assert_eq!(node.seen_count(), id as usize + 1);
        }
    }

    #[test]
    fn test_self_loops_are_dropped() {
        let node = node_with(&[0, 1, 0, 2]);
        assert_eq!(node.neighbors(), &[NodeIndex(1), NodeIndex(2)]);
    }

    #[test]
    fn test_misrouted_and_unrelated_events_are_ignored() {
        let mut node = node_with(&[1]);
        let misrouted = node.handle(Event::BlockDelivered {
            node: NodeIndex(9),
            block: test_block(1, 1),
            hops: 0,
        });
        assert!(misrouted.is_empty());
        assert!(!node.has_seen(BlockId(1)));

        let tick = node.handle(Event::WalletTick { wallet: WalletId(0) });
        assert!(tick.is_empty());
    }

    #[test]
    fn test_time_is_tracked() {
        let mut node = node_with(&[]);
        node.set_time(Duration::from_secs(5));
        assert_eq!(node.now(), Duration::from_secs(5));
    }
}
