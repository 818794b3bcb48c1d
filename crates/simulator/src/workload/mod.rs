//! Transaction workload generation.

mod fee;

pub use fee::FeeWorkload;

use powsim_types::{Transaction, WalletId};
use std::time::Duration;

/// Trait for generating transactions on behalf of wallets.
pub trait WorkloadGenerator {
    /// Generate the next transaction from `wallet` at virtual time `now`.
    fn generate_one(
        &mut self,
        wallet: WalletId,
        now: Duration,
        rng: &mut impl rand::Rng,
    ) -> Transaction;
}
