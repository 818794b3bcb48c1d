//! Gossiping node state machine.
//!
//! A node accepts each block once and relays it to its outgoing neighbors.
//! Delivery delays and traffic accounting are the network's concern; the
//! node only decides what to forward.

mod state;

pub use state::{GossipNode, NodeProfile};
