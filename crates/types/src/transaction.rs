//! Pending transaction type.

use crate::WalletId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base units per coin. Fee rates are expressed in base units per byte.
pub const UNITS_PER_COIN: f64 = 100_000_000.0;

/// A transaction submitted by a wallet.
///
/// Transactions are immutable; inclusion in a block consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Submitting wallet.
    pub sender: WalletId,

    /// Size in bytes.
    pub size: u64,

    /// Fee rate in base units per byte.
    pub fee_rate: u64,

    /// Virtual time the transaction entered the mempool.
    pub submitted_at: Duration,
}

impl Transaction {
    /// Create a new transaction.
    pub fn new(sender: WalletId, size: u64, fee_rate: u64, submitted_at: Duration) -> Self {
        Self {
            sender,
            size,
            fee_rate,
            submitted_at,
        }
    }

    /// Total fee in coins.
    pub fn fee(&self) -> f64 {
        (self.fee_rate * self.size) as f64 / UNITS_PER_COIN
    }
}
