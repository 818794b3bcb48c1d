//! Core types for the proof-of-work network simulator.
//!
//! Plain data only: identifiers, transactions, blocks, miners, and the
//! geographic coordinates the latency model works on.

mod block;
mod geo;
mod identifiers;
mod miner;
mod transaction;

pub use block::{block_size_for, Block, HEADER_SIZE, TX_COST};
pub use geo::{GeoPoint, EARTH_RADIUS_KM};
pub use identifiers::{BlockId, MinerId, NodeIndex, ShardId, WalletId};
pub use miner::{total_hashrate, Miner};
pub use transaction::{Transaction, UNITS_PER_COIN};

/// Seconds in a (365-day) year.
pub const YEAR_SECS: f64 = 365.0 * 24.0 * 3600.0;
