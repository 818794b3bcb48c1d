//! Single-assignment race results and join barriers.
//!
//! These are the coordination primitives behind `race` and `join`. They are
//! independent of the scheduler so their guarantees can be tested on their own.

use thiserror::Error;

/// Attempt to resolve a race that already has a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("race already resolved")]
pub struct AlreadyResolved;

/// A result cell that can be written exactly once.
///
/// The first call to [`RaceCell::resolve`] wins; every later call is rejected
/// and leaves the stored value untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceCell<T> {
    value: Option<T>,
}

impl<T> Default for RaceCell<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> RaceCell<T> {
    /// Create an unresolved cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the winner. Fails if a winner was already stored.
    pub fn resolve(&mut self, value: T) -> Result<(), AlreadyResolved> {
        if self.value.is_some() {
            return Err(AlreadyResolved);
        }
        self.value = Some(value);
        Ok(())
    }

    /// Check whether a winner has been stored.
    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    /// Get the winner, if any.
    pub fn winner(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Consume the cell, returning the winner.
    pub fn into_winner(self) -> Option<T> {
        self.value
    }
}

/// Countdown barrier that completes once all branches have arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCounter {
    remaining: usize,
    total: usize,
}

impl JoinCounter {
    /// Create a barrier waiting for `total` branches.
    pub fn new(total: usize) -> Self {
        Self {
            remaining: total,
            total,
        }
    }

    /// Record one arrival. Returns `true` exactly once, for the last branch.
    pub fn arrive(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    /// Check whether every branch has arrived.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Branches still outstanding.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Total number of branches.
    pub fn total(&self) -> usize {
        self.total
    }
}
