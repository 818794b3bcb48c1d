//! Run-level errors.

use crate::config::ConfigError;
use hdrhistogram::CreationError;
use powsim_mining::MiningError;
use powsim_simulation::{SchedulerError, TopologyError};
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a simulation run.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A mining race could not be set up.
    #[error(transparent)]
    Mining(#[from] MiningError),

    /// An event could not be scheduled.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The node graph could not be built.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Metrics histograms could not be created.
    #[error("failed to create metrics histogram: {0}")]
    Metrics(#[from] CreationError),

    /// Nothing left to process but the run has not terminated.
    #[error("event queue drained at {now:?} before the run terminated")]
    Stalled {
        /// Virtual time the queue ran dry.
        now: Duration,
    },
}
