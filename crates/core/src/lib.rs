//! Core types for the simulator.
//!
//! This crate provides the foundational types for the event-driven design:
//!
//! - [`Event`]: All possible inputs to the state machines
//! - [`Action`]: Outputs a gossip node hands back to the runner
//! - [`StateMachine`]: The trait that all state machines implement
//! - [`RaceCell`] / [`JoinCounter`]: single-assignment race results and join barriers
//! - [`RunStatistics`]: counters owned by the coordinator
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! All scheduling is handled by the runner, which:
//! 1. Delivers events to the state machine
//! 2. Executes the returned actions
//! 3. Schedules the resulting deliveries as new events

mod action;
mod event;
mod race;
mod stats;
mod traits;

pub use action::Action;
pub use event::Event;
pub use race::{AlreadyResolved, JoinCounter, RaceCell};
pub use stats::RunStatistics;
pub use traits::StateMachine;
