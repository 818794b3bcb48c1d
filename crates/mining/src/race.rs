//! Per-round mining race.
//!
//! Each miner's completion delay is exponential with rate
//! `hashrate / difficulty`:
//!
//! ```text
//! delay = -ln(U) * difficulty / hashrate,   U ~ uniform(0, 1]
//! ```
//!
//! Draws come from a per-miner ChaCha stream keyed by the round seed, so the
//! result does not depend on the order in which miners are sampled. Large
//! miner sets are sampled on the rayon pool; the output is a plain `Vec`
//! that the single-threaded coordinator schedules afterwards.

use crate::MiningError;
use powsim_core::RaceCell;
use powsim_types::{Miner, MinerId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::time::Duration;
use tracing::trace;

/// Miner count above which delays are sampled in parallel.
pub const PARALLEL_SAMPLING_THRESHOLD: usize = 4096;

/// A miner's drawn completion delay for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptDelay {
    /// The miner.
    pub miner: MinerId,
    /// Virtual time until the attempt completes.
    pub delay: Duration,
}

/// Validate a miner set and return its total hashrate.
pub fn validate_miners(miners: &[Miner]) -> Result<f64, MiningError> {
    if miners.is_empty() {
        return Err(MiningError::NoMiners);
    }
    for miner in miners {
        if !miner.hashrate.is_finite() || miner.hashrate < 0.0 {
            return Err(MiningError::InvalidHashrate {
                miner: miner.id,
                hashrate: miner.hashrate,
            });
        }
    }
    let total: f64 = miners.iter().map(|m| m.hashrate).sum();
    if total <= 0.0 {
        return Err(MiningError::ZeroHashrate);
    }
    if let Some(idle) = miners.iter().find(|m| m.hashrate <= 0.0) {
        return Err(MiningError::InvalidHashrate {
            miner: idle.id,
            hashrate: idle.hashrate,
        });
    }
    Ok(total)
}

/// Draw one completion delay per miner.
///
/// Fails when the miner set is empty, the total hashrate is zero, or the
/// difficulty is not a positive finite number.
pub fn sample_attempt_delays(
    miners: &[Miner],
    difficulty: f64,
    round_seed: u64,
) -> Result<Vec<AttemptDelay>, MiningError> {
    validate_miners(miners)?;
    if !difficulty.is_finite() || difficulty <= 0.0 {
        return Err(MiningError::InvalidDifficulty(difficulty));
    }

    if miners.len() >= PARALLEL_SAMPLING_THRESHOLD {
        trace!(miners = miners.len(), "Sampling attempt delays in parallel");
        miners
            .par_iter()
            .map(|miner| draw_delay(miner, difficulty, round_seed))
            .collect()
    } else {
        miners
            .iter()
            .map(|miner| draw_delay(miner, difficulty, round_seed))
            .collect()
    }
}

fn draw_delay(miner: &Miner, difficulty: f64, round_seed: u64) -> Result<AttemptDelay, MiningError> {
    if miner.hashrate <= 0.0 {
        return Err(MiningError::InvalidHashrate {
            miner: miner.id,
            hashrate: miner.hashrate,
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(round_seed);
    rng.set_stream(u64::from(miner.id.0));

    // gen() is in [0, 1); flip it so ln() never sees zero.
    let u = 1.0 - rng.gen::<f64>();
    let secs = -u.ln() * difficulty / miner.hashrate;
    let secs = if secs > 0.0 { secs } else { 0.0 };

    let delay = Duration::try_from_secs_f64(secs).map_err(|_| MiningError::DelayOutOfRange {
        miner: miner.id,
        secs,
    })?;
    Ok(AttemptDelay {
        miner: miner.id,
        delay,
    })
}

/// The attempt that will finish first. Ties go to the earlier entry.
pub fn fastest(delays: &[AttemptDelay]) -> Option<AttemptDelay> {
    delays.iter().copied().min_by_key(|a| a.delay)
}

/// Resolved winner of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceOutcome {
    /// Winning miner.
    pub miner: MinerId,
    /// Virtual time the winning attempt finished.
    pub finished_at: Duration,
}

/// State of one round's race.
///
/// The winner is held in a [`RaceCell`], so only the first finishing
/// attempt is recorded even if further completions are reported.
#[derive(Debug, Clone)]
pub struct MiningRace {
    round: u64,
    started_at: Duration,
    entrants: usize,
    result: RaceCell<RaceOutcome>,
}

impl MiningRace {
    /// Start a race for `round` at `started_at`.
    pub fn new(round: u64, started_at: Duration, entrants: usize) -> Self {
        Self {
            round,
            started_at,
            entrants,
            result: RaceCell::new(),
        }
    }

    /// Report a finished attempt.
    ///
    /// Returns the outcome for the first finisher and `None` for every
    /// later one.
    pub fn finish(&mut self, miner: MinerId, now: Duration) -> Option<RaceOutcome> {
        let outcome = RaceOutcome {
            miner,
            finished_at: now,
        };
        match self.result.resolve(outcome) {
            Ok(()) => Some(outcome),
            Err(_) => {
                trace!(round = self.round, %miner, "Late attempt ignored");
                None
            }
        }
    }

    /// Round number.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Number of miners that entered.
    pub fn entrants(&self) -> usize {
        self.entrants
    }

    /// Winner, once resolved.
    pub fn outcome(&self) -> Option<RaceOutcome> {
        self.result.winner().copied()
    }

    /// Time from race start to the winning attempt.
    pub fn duration(&self) -> Option<Duration> {
        self.outcome()
            .map(|o| o.finished_at.saturating_sub(self.started_at))
    }
}
