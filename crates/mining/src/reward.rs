//! Block subsidy with periodic halving.

use tracing::debug;

/// Number of halvings after which the subsidy is zero.
pub const MAX_HALVINGS: u32 = 35;

/// Per-block subsidy schedule.
///
/// Each accepted block mints the current subsidy. After every
/// `halving_interval` blocks the subsidy halves; once [`MAX_HALVINGS`]
/// halvings have happened it is zero for good. An interval of zero
/// disables halving.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardSchedule {
    initial: f64,
    subsidy: f64,
    halving_interval: u64,
    halvings: u32,
}

impl RewardSchedule {
    /// Schedule starting at `initial` coins per block.
    pub fn new(initial: f64, halving_interval: u64) -> Self {
        Self {
            initial,
            subsidy: initial,
            halving_interval,
            halvings: 0,
        }
    }

    /// Mint the subsidy for the accepted block at `height` (1-based) and
    /// return the amount. Halving happens after minting when `height` is a
    /// multiple of the interval.
    pub fn mint(&mut self, height: u64) -> f64 {
        let minted = if self.halvings < MAX_HALVINGS {
            self.subsidy
        } else {
            0.0
        };

        if self.halving_interval > 0
            && height % self.halving_interval == 0
            && self.halvings < MAX_HALVINGS
        {
            self.halvings += 1;
            self.subsidy = if self.halvings < MAX_HALVINGS {
                self.subsidy / 2.0
            } else {
                0.0
            };
            debug!(
                height,
                halvings = self.halvings,
                subsidy = self.subsidy,
                "Subsidy halved"
            );
        }
        minted
    }

    /// Subsidy the next block will mint.
    pub fn subsidy(&self) -> f64 {
        if self.halvings < MAX_HALVINGS {
            self.subsidy
        } else {
            0.0
        }
    }

    /// Starting subsidy.
    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Halvings so far.
    pub fn halvings(&self) -> u32 {
        self.halvings
    }

    /// Blocks per halving (0 = never).
    pub fn halving_interval(&self) -> u64 {
        self.halving_interval
    }
}
