//! Deterministic discrete-event machinery.
//!
//! Given the same seed, everything in this crate produces identical results
//! every run: virtual time only advances by popping the event queue, and all
//! randomness comes from a caller-supplied ChaCha RNG.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Scheduler<E>                         │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, Entry<E>>)     │ │
//! │  │     Ordered by: time, submission sequence          │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │  timers, race branches,     │
//! │                           │  join branches              │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     GossipNetwork                                  │ │
//! │  │     nodes: Vec<GossipNode>, LatencyModel           │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     ForwardBlock actions → delayed deliveries      │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod event_queue;
mod gossip;
mod network;
mod scheduler;
mod topology;

pub use event_queue::EventKey;
pub use gossip::{Delivery, GossipNetwork};
pub use network::{
    default_bandwidths_mbps, default_locations, FastChainScaling, LatencyModel, Location,
    NetworkConfig,
};
pub use scheduler::{JoinId, RaceId, Scheduler, SchedulerError};
pub use topology::{shard_by_latency, Topology, TopologyError};
