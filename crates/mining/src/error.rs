//! Error types for the mining race.

use powsim_types::MinerId;
use thiserror::Error;

/// Errors raised when a mining race cannot be set up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MiningError {
    /// No miners are configured.
    #[error("mining race needs at least one miner")]
    NoMiners,

    /// Total hashrate is zero, so the expected block time is undefined.
    #[error("total hashrate is zero")]
    ZeroHashrate,

    /// A miner has a non-positive or non-finite hashrate.
    #[error("miner {miner} has invalid hashrate {hashrate}")]
    InvalidHashrate {
        /// Offending miner.
        miner: MinerId,
        /// Its hashrate.
        hashrate: f64,
    },

    /// Difficulty is non-positive or non-finite.
    #[error("invalid difficulty {0}")]
    InvalidDifficulty(f64),

    /// A drawn delay cannot be represented as a virtual duration.
    #[error("attempt delay of {secs}s for miner {miner} is out of range")]
    DelayOutOfRange {
        /// Miner whose draw overflowed.
        miner: MinerId,
        /// The drawn delay in seconds.
        secs: f64,
    },
}
