//! Virtual-time cooperative scheduler.
//!
//! Three primitives drive the simulation:
//!
//! - [`Scheduler::delay`] delivers an event after a virtual delay.
//! - [`Scheduler::race`] submits several branches; only the earliest is
//!   delivered and the rest are removed from the queue.
//! - [`Scheduler::join`] delivers a completion event once every branch
//!   delay has elapsed.
//!
//! Callers pull events with [`Scheduler::next`] and handle each one to
//! completion before pulling the next, so handlers never interleave.

use crate::EventKey;
use powsim_core::{JoinCounter, RaceCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Errors raised while scheduling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// Delay is negative, NaN, or too large to represent.
    #[error("invalid delay: {0}s")]
    InvalidDelay(f64),

    /// A race was submitted with no branches.
    #[error("race needs at least one branch")]
    EmptyRace,
}

/// Handle to a submitted race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RaceId(pub u64);

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Race({})", self.0)
    }
}

/// Handle to a submitted join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinId(pub u64);

impl fmt::Display for JoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Join({})", self.0)
    }
}

#[derive(Debug)]
enum Entry<E> {
    Timer(E),
    RaceBranch { race: RaceId, branch: usize, event: E },
    JoinBranch { join: JoinId },
}

#[derive(Debug)]
struct RaceState {
    winner: RaceCell<usize>,
    keys: Vec<EventKey>,
}

#[derive(Debug)]
struct JoinState<E> {
    barrier: JoinCounter,
    on_complete: Option<E>,
}

/// Discrete-event scheduler over events of type `E`.
#[derive(Debug)]
pub struct Scheduler<E> {
    queue: BTreeMap<EventKey, Entry<E>>,
    now: Duration,
    sequence: u64,
    next_race: u64,
    next_join: u64,
    races: HashMap<RaceId, RaceState>,
    joins: HashMap<JoinId, JoinState<E>>,
    delivered: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            queue: BTreeMap::new(),
            now: Duration::ZERO,
            sequence: 0,
            next_race: 0,
            next_join: 0,
            races: HashMap::new(),
            joins: HashMap::new(),
            delivered: 0,
        }
    }
}

impl<E> Scheduler<E> {
    /// Create an empty scheduler at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Queue entries not yet popped, including join branches.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing remains to deliver.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events handed out by [`Scheduler::next`] so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Races submitted but not yet resolved or cancelled.
    pub fn open_races(&self) -> usize {
        self.races.len()
    }

    fn push(&mut self, delay: Duration, entry: Entry<E>) -> EventKey {
        let key = EventKey::new(self.now.saturating_add(delay), self.sequence);
        self.sequence += 1;
        self.queue.insert(key, entry);
        key
    }

    /// Deliver `event` after `delay`.
    pub fn delay(&mut self, delay: Duration, event: E) -> EventKey {
        self.push(delay, Entry::Timer(event))
    }

    /// Deliver `event` after `secs` seconds.
    pub fn delay_secs(&mut self, secs: f64, event: E) -> Result<EventKey, SchedulerError> {
        let delay = to_duration(secs)?;
        Ok(self.delay(delay, event))
    }

    /// Submit competing branches. Only the earliest is delivered; at equal
    /// times the branch listed first wins.
    pub fn race(&mut self, branches: Vec<(Duration, E)>) -> Result<RaceId, SchedulerError> {
        if branches.is_empty() {
            return Err(SchedulerError::EmptyRace);
        }
        let race = RaceId(self.next_race);
        self.next_race += 1;

        let keys = branches
            .into_iter()
            .enumerate()
            .map(|(branch, (delay, event))| {
                self.push(delay, Entry::RaceBranch { race, branch, event })
            })
            .collect();
        self.races.insert(
            race,
            RaceState {
                winner: RaceCell::new(),
                keys,
            },
        );
        Ok(race)
    }

    /// Deliver `on_complete` once every delay in `delays` has elapsed.
    /// With no delays it is delivered immediately.
    pub fn join(&mut self, delays: Vec<Duration>, on_complete: E) -> JoinId {
        let join = JoinId(self.next_join);
        self.next_join += 1;

        if delays.is_empty() {
            self.delay(Duration::ZERO, on_complete);
            return join;
        }

        self.joins.insert(
            join,
            JoinState {
                barrier: JoinCounter::new(delays.len()),
                on_complete: Some(on_complete),
            },
        );
        for delay in delays {
            self.push(delay, Entry::JoinBranch { join });
        }
        join
    }

    /// Abandon a race without delivering any of its branches.
    pub fn cancel_race(&mut self, race: RaceId) -> bool {
        let Some(state) = self.races.remove(&race) else {
            return false;
        };
        for key in state.keys {
            self.queue.remove(&key);
        }
        trace!(%race, "Race cancelled");
        true
    }

    /// Pop the next deliverable event and advance time to it.
    pub fn next(&mut self) -> Option<(Duration, E)> {
        loop {
            let (key, entry) = self.queue.pop_first()?;
            self.now = key.time;

            let event = match entry {
                Entry::Timer(event) => Some(event),
                Entry::RaceBranch { race, branch, event } => self.resolve_race(key, race, branch, event),
                Entry::JoinBranch { join } => self.arrive(join),
            };

            if let Some(event) = event {
                self.delivered += 1;
                return Some((key.time, event));
            }
        }
    }

    fn resolve_race(&mut self, key: EventKey, race: RaceId, branch: usize, event: E) -> Option<E> {
        let mut state = self.races.remove(&race)?;
        if state.winner.resolve(branch).is_err() {
            return None;
        }
        let abandoned = state.keys.len() - 1;
        for other in state.keys.drain(..).filter(|k| *k != key) {
            self.queue.remove(&other);
        }
        trace!(%race, branch, abandoned, "Race resolved");
        Some(event)
    }

    fn arrive(&mut self, join: JoinId) -> Option<E> {
        let state = self.joins.get_mut(&join)?;
        if !state.barrier.arrive() {
            return None;
        }
        let event = state.on_complete.take();
        self.joins.remove(&join);
        trace!(%join, "Join complete");
        event
    }
}

fn to_duration(secs: f64) -> Result<Duration, SchedulerError> {
    Duration::try_from_secs_f64(secs).map_err(|_| SchedulerError::InvalidDelay(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler<&'static str>) -> Vec<(Duration, &'static str)> {
        std::iter::from_fn(|| scheduler.next()).collect()
    }

    #[test]
    fn test_delay_advances_time() {
        let mut scheduler = Scheduler::new();
        scheduler.delay(Duration::from_secs(3), "b");
        scheduler.delay(Duration::from_secs(1), "a");

        assert_eq!(scheduler.next(), Some((Duration::from_secs(1), "a")));
        assert_eq!(scheduler.now(), Duration::from_secs(1));
        scheduler.delay(Duration::from_secs(1), "c");

        assert_eq!(
            drain(&mut scheduler),
            vec![(Duration::from_secs(2), "c"), (Duration::from_secs(3), "b")]
        );
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.delivered(), 3);
    }

    #[test]
    fn test_equal_times_fire_fifo() {
        let mut scheduler = Scheduler::new();
        for name in ["first", "second", "third"] {
            scheduler.delay(Duration::from_secs(1), name);
        }
        let order: Vec<_> = drain(&mut scheduler).into_iter().map(|(_, e)| e).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_invalid_delay_is_rejected() {
        let mut scheduler: Scheduler<&str> = Scheduler::new();
        assert_eq!(
            scheduler.delay_secs(-1.0, "x"),
            Err(SchedulerError::InvalidDelay(-1.0))
        );
        assert!(scheduler.delay_secs(f64::NAN, "x").is_err());
        assert!(scheduler.delay_secs(f64::INFINITY, "x").is_err());
        assert!(scheduler.delay_secs(0.5, "x").is_ok());
    }

    #[test]
    fn test_race_delivers_only_earliest_branch() {
        let mut scheduler = Scheduler::new();
        scheduler
            .race(vec![
                (Duration::from_secs(5), "slow"),
                (Duration::from_secs(2), "fast"),
                (Duration::from_secs(9), "slowest"),
            ])
            .unwrap();
        scheduler.delay(Duration::from_secs(20), "after");

        assert_eq!(
            drain(&mut scheduler),
            vec![(Duration::from_secs(2), "fast"), (Duration::from_secs(20), "after")]
        );
        assert_eq!(scheduler.open_races(), 0);
    }

    #[test]
    fn test_race_tie_goes_to_first_branch() {
        let mut scheduler = Scheduler::new();
        scheduler
            .race(vec![(Duration::from_secs(1), "a"), (Duration::from_secs(1), "b")])
            .unwrap();
        assert_eq!(drain(&mut scheduler), vec![(Duration::from_secs(1), "a")]);
    }

    #[test]
    fn test_empty_race_is_rejected() {
        let mut scheduler: Scheduler<&str> = Scheduler::new();
        assert_eq!(scheduler.race(vec![]), Err(SchedulerError::EmptyRace));
    }

    #[test]
    fn test_cancelled_race_delivers_nothing() {
        let mut scheduler = Scheduler::new();
        let race = scheduler
            .race(vec![(Duration::from_secs(1), "a"), (Duration::from_secs(2), "b")])
            .unwrap();
        assert!(scheduler.cancel_race(race));
        assert!(!scheduler.cancel_race(race));
        assert!(scheduler.next().is_none());
    }

    #[test]
    fn test_join_fires_after_last_branch() {
        let mut scheduler = Scheduler::new();
        scheduler.join(
            vec![Duration::from_secs(4), Duration::from_secs(1), Duration::from_secs(7)],
            "joined",
        );
        scheduler.delay(Duration::from_secs(5), "tick");

        assert_eq!(
            drain(&mut scheduler),
            vec![(Duration::from_secs(5), "tick"), (Duration::from_secs(7), "joined")]
        );
    }

    #[test]
    fn test_join_after_race_at_same_time() {
        let mut scheduler = Scheduler::new();
        scheduler
            .race(vec![(Duration::from_secs(3), "won"), (Duration::from_secs(8), "lost")])
            .unwrap();
        scheduler.join(vec![Duration::from_secs(3)], "joined");

        let order: Vec<_> = drain(&mut scheduler).into_iter().map(|(_, e)| e).collect();
        assert_eq!(order, vec!["won", "joined"]);
    }

    #[test]
    fn test_empty_join_fires_immediately() {
        let mut scheduler = Scheduler::new();
        scheduler.delay(Duration::from_secs(1), "later");
        scheduler.join(vec![], "now");
        assert_eq!(scheduler.next(), Some((Duration::ZERO, "now")));
    }
}
