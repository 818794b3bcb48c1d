//! Event queue ordering.

use std::time::Duration;

/// Ordering key for the event queue.
///
/// Events fire in time order. At equal times they fire in the order they
/// were submitted, so the queue is FIFO within a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// Virtual time the event fires.
    pub time: Duration,
    /// Monotonic submission counter.
    pub sequence: u64,
}

impl EventKey {
    /// Create a key.
    pub fn new(time: Duration, sequence: u64) -> Self {
        Self { time, sequence }
    }
}
