//! Wallets that submit transactions on a fixed interval.

use crate::config::WorkloadConfig;
use crate::workload::{FeeWorkload, WorkloadGenerator};
use powsim_core::Event;
use powsim_mempool::Mempool;
use powsim_simulation::Scheduler;
use powsim_types::WalletId;
use rand::Rng;
use std::time::Duration;

/// Every wallet waits `interval`, submits one transaction, and repeats
/// until it has submitted its quota.
#[derive(Debug, Clone)]
pub struct Wallets<G = FeeWorkload> {
    remaining: Vec<u64>,
    interval: Duration,
    generator: G,
    submitted: u64,
}

impl Wallets<FeeWorkload> {
    /// Wallets described by a workload configuration.
    pub fn from_config(config: &WorkloadConfig) -> Self {
        Self::new(
            config.wallets,
            config.transactions_per_wallet,
            config.interval,
            FeeWorkload::from_config(config),
        )
    }
}

impl<G: WorkloadGenerator> Wallets<G> {
    /// `count` wallets each submitting `per_wallet` transactions.
    pub fn new(count: u32, per_wallet: u64, interval: Duration, generator: G) -> Self {
        Self {
            remaining: vec![per_wallet; count as usize],
            interval,
            generator,
            submitted: 0,
        }
    }

    /// Schedule every wallet's first submission.
    pub fn start(&self, scheduler: &mut Scheduler<Event>) {
        for (wallet, remaining) in self.remaining.iter().enumerate() {
            if *remaining > 0 {
                scheduler.delay(
                    self.interval,
                    Event::WalletTick {
                        wallet: WalletId(wallet as u32),
                    },
                );
            }
        }
    }

    /// Submit `wallet`'s next transaction and schedule the one after it.
    pub fn on_tick(
        &mut self,
        wallet: WalletId,
        scheduler: &mut Scheduler<Event>,
        mempool: &mut Mempool,
        rng: &mut impl Rng,
    ) {
        let Some(remaining) = self.remaining.get_mut(wallet.0 as usize) else {
            return;
        };
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        let more = *remaining > 0;

        let tx = self.generator.generate_one(wallet, scheduler.now(), rng);
        mempool.submit(tx);
        self.submitted += 1;

        if more {
            scheduler.delay(self.interval, Event::WalletTick { wallet });
        }
    }

    /// Transactions submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Transactions still to be submitted.
    pub fn outstanding(&self) -> u64 {
        self.remaining.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powsim_mempool::OrderingMode;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_wallets_submit_quota_on_interval() {
        let mut wallets = Wallets::new(2, 3, Duration::from_secs(5), FeeWorkload::new(256));
        let mut scheduler = Scheduler::new();
        let mut mempool = Mempool::new(OrderingMode::Fifo);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        wallets.start(&mut scheduler);
        let mut times = Vec::new();
        while let Some((time, event)) = scheduler.next() {
            if let Event::WalletTick { wallet } = event {
                wallets.on_tick(wallet, &mut scheduler, &mut mempool, &mut rng);
                times.push(time);
            }
        }

        assert_eq!(mempool.len(), 6);
        assert_eq!(wallets.submitted(), 6);
        assert_eq!(wallets.outstanding(), 0);
        assert_eq!(times.first(), Some(&Duration::from_secs(5)));
        assert_eq!(times.last(), Some(&Duration::from_secs(15)));
    }

    #[test]
    fn test_empty_quota_schedules_nothing() {
        let wallets = Wallets::new(4, 0, Duration::from_secs(1), FeeWorkload::new(256));
        let mut scheduler = Scheduler::new();
        wallets.start(&mut scheduler);
        assert!(scheduler.is_idle());
    }
}
