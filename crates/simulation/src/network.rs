//! Network latency model.
//!
//! A block sent from `a` to `b` arrives after
//!
//! ```text
//! (base + distance / fiber_speed + jitter) * congestion + size * overhead / bandwidth * variation
//! ```
//!
//! clamped to a fraction of the target block time. Distances are great-circle
//! distances between the nodes' cities and are cached per node pair.

use powsim_node::{GossipNode, NodeProfile};
use powsim_types::{GeoPoint, NodeIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// A named city nodes can be placed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// City name.
    pub name: String,
    /// Coordinates.
    pub point: GeoPoint,
}

impl Location {
    /// Create a location.
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            point: GeoPoint::new(lat, lon),
        }
    }
}

/// Cities used when no location table is configured.
pub fn default_locations() -> Vec<Location> {
    vec![
        Location::new("New York", 40.71, -74.01),
        Location::new("San Francisco", 37.77, -122.42),
        Location::new("Sao Paulo", -23.55, -46.63),
        Location::new("London", 51.51, -0.13),
        Location::new("Frankfurt", 50.11, 8.68),
        Location::new("Johannesburg", -26.20, 28.05),
        Location::new("Mumbai", 19.08, 72.88),
        Location::new("Singapore", 1.35, 103.82),
        Location::new("Tokyo", 35.68, 139.69),
        Location::new("Sydney", -33.87, 151.21),
    ]
}

/// Link speeds (Mbit/s) used when no bandwidth table is configured.
pub fn default_bandwidths_mbps() -> Vec<f64> {
    vec![50.0, 100.0, 200.0]
}

/// Delay scaling applied to chains with short block times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastChainScaling {
    /// Chains with a target block time below this are scaled.
    pub threshold: Duration,
    /// Multiplier applied to every delay.
    pub factor: f64,
}

impl Default for FastChainScaling {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(300),
            factor: 0.1,
        }
    }
}

/// Tunables for the latency model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Fixed per-hop processing delay.
    pub base_latency: Duration,
    /// Upper bound of the uniform jitter.
    pub max_jitter: Duration,
    /// Range of the uniform congestion multiplier.
    pub congestion: (f64, f64),
    /// Latency floor before transmission time is added.
    pub min_latency: Duration,
    /// Signal speed in fiber, km/s.
    pub fiber_speed_km_s: f64,
    /// Protocol overhead multiplier on block size.
    pub tcp_overhead: f64,
    /// Range of the uniform transmission-time multiplier.
    pub transmission_variation: (f64, f64),
    /// Cap on a single delivery as a fraction of the target block time.
    pub max_delay_fraction: f64,
    /// Optional scaling for fast chains. Off by default.
    pub fast_chain_scaling: Option<FastChainScaling>,
    /// Cities nodes are placed in, uniformly at random.
    pub locations: Vec<Location>,
    /// Link speeds in Mbit/s, assigned uniformly at random.
    pub bandwidths_mbps: Vec<f64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_latency: Duration::from_millis(1),
            max_jitter: Duration::from_millis(2),
            congestion: (1.0, 1.5),
            min_latency: Duration::from_millis(1),
            fiber_speed_km_s: 200_000.0,
            tcp_overhead: 1.1,
            transmission_variation: (0.9, 1.1),
            max_delay_fraction: 0.25,
            fast_chain_scaling: None,
            locations: default_locations(),
            bandwidths_mbps: default_bandwidths_mbps(),
        }
    }
}

impl NetworkConfig {
    /// Default network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delivery cap as a fraction of the target block time.
    pub fn with_max_delay_fraction(mut self, fraction: f64) -> Self {
        self.max_delay_fraction = fraction;
        self
    }

    /// Enable fast-chain delay scaling.
    pub fn with_fast_chain_scaling(mut self, scaling: FastChainScaling) -> Self {
        self.fast_chain_scaling = Some(scaling);
        self
    }

    /// Replace the location table.
    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }

    /// Replace the bandwidth table.
    pub fn with_bandwidths_mbps(mut self, bandwidths: Vec<f64>) -> Self {
        self.bandwidths_mbps = bandwidths;
        self
    }

    /// Set the base per-hop latency.
    pub fn with_base_latency(mut self, latency: Duration) -> Self {
        self.base_latency = latency;
        self
    }

    /// Pick a random city and link speed for a new node.
    pub fn sample_profile(&self, rng: &mut impl Rng) -> NodeProfile {
        let location = if self.locations.is_empty() {
            Location::new("Null Island", 0.0, 0.0)
        } else {
            self.locations[rng.gen_range(0..self.locations.len())].clone()
        };
        let mbps = if self.bandwidths_mbps.is_empty() {
            100.0
        } else {
            self.bandwidths_mbps[rng.gen_range(0..self.bandwidths_mbps.len())]
        };
        NodeProfile {
            location: location.name,
            point: location.point,
            bandwidth: mbps_to_bytes_per_sec(mbps),
        }
    }
}

/// Convert a link speed in Mbit/s to bytes per second.
pub fn mbps_to_bytes_per_sec(mbps: f64) -> f64 {
    mbps * 1024.0 * 1024.0 / 8.0
}

fn uniform(rng: &mut impl Rng, (low, high): (f64, f64)) -> f64 {
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

/// Computes per-hop delivery delays.
#[derive(Debug, Clone)]
pub struct LatencyModel {
    config: NetworkConfig,
    max_delay: f64,
    scale: f64,
    distances: HashMap<(NodeIndex, NodeIndex), f64>,
}

impl LatencyModel {
    /// Model for a chain with the given target block time.
    pub fn new(config: NetworkConfig, target_block_time: Duration) -> Self {
        let max_delay = config.max_delay_fraction * target_block_time.as_secs_f64();
        let scale = match config.fast_chain_scaling {
            Some(scaling) if target_block_time < scaling.threshold => scaling.factor,
            _ => 1.0,
        };
        Self {
            config,
            max_delay,
            scale,
            distances: HashMap::new(),
        }
    }

    /// Model configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Upper bound on any single delivery.
    pub fn max_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay).unwrap_or(Duration::MAX)
    }

    /// Distinct node pairs with a cached distance.
    pub fn cached_pairs(&self) -> usize {
        self.distances.len()
    }

    /// Great-circle distance between two nodes, cached per unordered pair.
    pub fn distance_km(&mut self, a: &GossipNode, b: &GossipNode) -> f64 {
        let key = if a.index() <= b.index() {
            (a.index(), b.index())
        } else {
            (b.index(), a.index())
        };
        *self
            .distances
            .entry(key)
            .or_insert_with(|| a.profile().point.distance_km(&b.profile().point))
    }

    /// Propagation latency in seconds, excluding transmission.
    pub fn link_latency(&mut self, a: &GossipNode, b: &GossipNode, rng: &mut impl Rng) -> f64 {
        let distance = self.distance_km(a, b);
        let propagation = distance / self.config.fiber_speed_km_s;
        let jitter = uniform(rng, (0.0, self.config.max_jitter.as_secs_f64()));
        let congestion = uniform(rng, self.config.congestion);

        let latency = (self.config.base_latency.as_secs_f64() + propagation + jitter) * congestion;
        latency.max(self.config.min_latency.as_secs_f64())
    }

    /// Time to push `size` bytes over a link of `bandwidth` bytes/s.
    pub fn transmission_time(&self, size: u64, bandwidth: f64, rng: &mut impl Rng) -> f64 {
        let effective = size as f64 * self.config.tcp_overhead;
        let variation = uniform(rng, self.config.transmission_variation);
        effective / bandwidth * variation
    }

    /// Full delivery delay for a block of `size` bytes from `from` to `to`.
    ///
    /// The slower of the two links bounds transmission. The result never
    /// exceeds [`LatencyModel::max_delay`].
    pub fn delivery_delay(
        &mut self,
        from: &GossipNode,
        to: &GossipNode,
        size: u64,
        rng: &mut impl Rng,
    ) -> Duration {
        let latency = self.link_latency(from, to, rng);
        let bandwidth = from.profile().bandwidth.min(to.profile().bandwidth);
        let transmission = self.transmission_time(size, bandwidth, rng);

        let raw = (latency + transmission) * self.scale;
        let clamped = raw.min(self.max_delay);
        trace!(
            from = %from.index(),
            to = %to.index(),
            latency,
            transmission,
            delay = clamped,
            "Delivery delay"
        );
        Duration::try_from_secs_f64(clamped).unwrap_or_else(|_| self.max_delay())
    }

    /// Deterministic upper bound on link latency: maximum jitter and
    /// congestion, no transmission. Used to group nodes into shards.
    pub fn worst_case_latency(&mut self, a: &GossipNode, b: &GossipNode) -> Duration {
        let distance = self.distance_km(a, b);
        let (_, congestion) = self.config.congestion;
        let secs = (self.config.base_latency.as_secs_f64()
            + self.config.max_jitter.as_secs_f64()
            + distance / self.config.fiber_speed_km_s)
            * congestion.max(1.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn node_at(index: u32, lat: f64, lon: f64, mbps: f64) -> GossipNode {
        GossipNode::new(
            NodeIndex(index),
            NodeProfile {
                location: format!("node-{index}"),
                point: GeoPoint::new(lat, lon),
                bandwidth: mbps_to_bytes_per_sec(mbps),
            },
        )
    }

    #[test]
    fn test_colocated_nodes_get_floor_latency_range() {
        let mut model = LatencyModel::new(NetworkConfig::default(), Duration::from_secs(600));
        let a = node_at(0, 10.0, 10.0, 100.0);
        let b = node_at(1, 10.0, 10.0, 100.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            let latency = model.link_latency(&a, &b, &mut rng);
            // (1ms + 0..2ms) * 1.0..1.5
            assert!((0.001..=0.0045).contains(&latency), "latency {latency}");
        }
    }

    #[test]
    fn test_distance_is_cached_per_unordered_pair() {
        let mut model = LatencyModel::new(NetworkConfig::default(), Duration::from_secs(600));
        let london = node_at(0, 51.51, -0.13, 100.0);
        let new_york = node_at(1, 40.71, -74.01, 100.0);

        let there = model.distance_km(&london, &new_york);
        let back = model.distance_km(&new_york, &london);
        assert_eq!(there, back);
        assert_eq!(model.cached_pairs(), 1);
        assert!((5500.0..5650.0).contains(&there), "distance {there}");
    }

    #[test]
    fn test_delay_is_clamped_to_fraction_of_block_time() {
        let config = NetworkConfig::default().with_max_delay_fraction(0.25);
        let mut model = LatencyModel::new(config, Duration::from_millis(40));
        let sydney = node_at(0, -33.87, 151.21, 1.0);
        let london = node_at(1, 51.51, -0.13, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let delay = model.delivery_delay(&sydney, &london, 1_000_000, &mut rng);
        assert_eq!(delay, Duration::from_millis(10));
        assert_eq!(model.max_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_transmission_scales_with_size() {
        let model = LatencyModel::new(NetworkConfig::default(), Duration::from_secs(600));
        let bandwidth = mbps_to_bytes_per_sec(8.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let t = model.transmission_time(1024 * 1024, bandwidth, &mut rng);
        // 1 MiB at 1 MiB/s with 1.1 overhead and 0.9..1.1 variation.
        assert!((0.99..=1.21).contains(&t), "transmission {t}");
    }

    #[test]
    fn test_fast_chain_scaling_applies_below_threshold() {
        let config = NetworkConfig::default().with_fast_chain_scaling(FastChainScaling::default());
        let a = node_at(0, 0.0, 0.0, 100.0);
        let b = node_at(1, 0.0, 90.0, 100.0);

        let mut slow = LatencyModel::new(config.clone(), Duration::from_secs(600));
        let mut fast = LatencyModel::new(config, Duration::from_secs(60));
        let slow_delay = slow.delivery_delay(&a, &b, 1024, &mut ChaCha8Rng::seed_from_u64(4));
        let fast_delay = fast.delivery_delay(&a, &b, 1024, &mut ChaCha8Rng::seed_from_u64(4));

        let ratio = fast_delay.as_secs_f64() / slow_delay.as_secs_f64();
        assert!((ratio - 0.1).abs() < 1e-6, "ratio {ratio}");
    }

    #[test]
    fn test_worst_case_latency_is_deterministic() {
        let mut model = LatencyModel::new(NetworkConfig::default(), Duration::from_secs(600));
        let a = node_at(0, 0.0, 0.0, 100.0);
        let b = node_at(1, 0.0, 0.0, 100.0);
        // (1ms + 2ms + 0) * 1.5
        let latency = model.worst_case_latency(&a, &b);
        assert!((latency.as_secs_f64() - 0.0045).abs() < 1e-9);
    }

    #[test]
    fn test_sample_profile_uses_tables() {
        let config = NetworkConfig::default()
            .with_locations(vec![Location::new("Lisbon", 38.72, -9.14)])
            .with_bandwidths_mbps(vec![80.0]);
        let profile = config.sample_profile(&mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(profile.location, "Lisbon");
        assert_eq!(profile.bandwidth, 10_485_760.0);
    }
}
