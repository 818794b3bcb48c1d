//! Proof-of-work control loops.
//!
//! - [`race`]: per-round mining race. Every miner draws an exponential
//!   completion delay; the earliest finisher wins the round.
//! - [`DifficultyController`]: retargets difficulty every
//!   [`RETARGET_WINDOW`] blocks toward the target block time.
//! - [`RewardSchedule`]: per-block subsidy with periodic halving.
//!
//! Everything here is synchronous and deterministic given its inputs; the
//! scheduler and the coordinator live in the simulation crates.

mod difficulty;
mod error;
pub mod race;
mod reward;

pub use difficulty::{DifficultyController, RetargetOutcome, RETARGET_WINDOW};
pub use error::MiningError;
pub use race::{fastest, sample_attempt_delays, AttemptDelay, MiningRace, RaceOutcome};
pub use reward::{RewardSchedule, MAX_HALVINGS};
