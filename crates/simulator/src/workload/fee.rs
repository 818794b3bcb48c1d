//! Fixed-size transactions with uniformly drawn fee rates.

use crate::config::WorkloadConfig;
use crate::workload::WorkloadGenerator;
use powsim_types::{Transaction, WalletId};
use std::time::Duration;

/// Generates fixed-size transactions whose fee rate is uniform over a
/// range. Without fees every transaction carries rate 0.
#[derive(Debug, Clone)]
pub struct FeeWorkload {
    tx_size: u64,
    fee_rate: Option<(u64, u64)>,
}

impl FeeWorkload {
    /// Fee-free transactions of `tx_size` bytes.
    pub fn new(tx_size: u64) -> Self {
        Self {
            tx_size,
            fee_rate: None,
        }
    }

    /// Draw fee rates uniformly from `min..=max`.
    pub fn with_fee_rate(mut self, min: u64, max: u64) -> Self {
        self.fee_rate = Some((min.min(max), max.max(min)));
        self
    }

    /// Generator matching a workload configuration.
    pub fn from_config(config: &WorkloadConfig) -> Self {
        let workload = Self::new(config.tx_size);
        if config.fees {
            let (min, max) = config.fee_rate;
            workload.with_fee_rate(min, max)
        } else {
            workload
        }
    }
}

impl WorkloadGenerator for FeeWorkload {
    fn generate_one(
        &mut self,
        wallet: WalletId,
        now: Duration,
        rng: &mut impl rand::Rng,
    ) -> Transaction {
        let fee_rate = match self.fee_rate {
            Some((min, max)) => rng.gen_range(min..=max),
            None => 0,
        };
        Transaction::new(wallet, self.tx_size, fee_rate, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_fee_rates_stay_in_range() {
        let mut workload = FeeWorkload::new(300).with_fee_rate(5, 9);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            let tx = workload.generate_one(WalletId(2), Duration::from_secs(4), &mut rng);
            assert!((5..=9).contains(&tx.fee_rate));
            assert_eq!(tx.size, 300);
            assert_eq!(tx.sender, WalletId(2));
            assert_eq!(tx.submitted_at, Duration::from_secs(4));
        }
    }

    #[test]
    fn test_no_fees_without_fee_mode() {
        let config = WorkloadConfig::default();
        let mut workload = FeeWorkload::from_config(&config);
        let tx = workload.generate_one(WalletId(0), Duration::ZERO, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(tx.fee_rate, 0);
    }
}
