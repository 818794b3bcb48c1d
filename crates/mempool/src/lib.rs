//! Transaction pool.
//!
//! Pending transactions are kept in priority order: highest fee rate first,
//! or plain arrival order when fee prioritization is disabled. Blocks drain
//! the pool with [`Mempool::take_top`].

mod pool;

pub use pool::{Mempool, OrderingMode};
