//! Cancellable one-shot timers on a monotonic clock.
//!
//! Time is expressed as the [`Duration`] elapsed since the client started.
//! The owner of a timer keeps its [`TimerId`] and clears it on cancellation;
//! a canceled timer is removed from the queue and can never fire.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle to a scheduled timer. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Retry the connection after an unexpected close
    Reconnect,
    /// Periodic check that restarts a dead connection
    LivenessCheck,
    /// Move a breathing session to its next phase
    PhaseAdvance { session: u64 },
    /// End a breathing session automatically
    AutoClose { session: u64 },
    /// Remove a displayed encouraging message
    ClearEncouragement { token: u64 },
}

/// A timer that has come due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub kind: TimerKind,
    /// The instant the timer was scheduled for
    pub deadline: Duration,
}

/// Queue of pending timers ordered by deadline, then scheduling order.
#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    queue: BTreeMap<(Duration, TimerId), TimerKind>,
    deadlines: HashMap<TimerId, Duration>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire `delay` after `now`.
    pub fn schedule(&mut self, now: Duration, delay: Duration, kind: TimerKind) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let deadline = now + delay;
        self.queue.insert((deadline, id), kind);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was canceled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.queue.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.first_key_value().map(|((deadline, _), _)| *deadline)
    }

    /// Remove and return the earliest timer due at or before `now`.
    ///
    /// Timers are popped one at a time so a handler can cancel timers that
    /// are due in the same pass.
    pub fn pop_due(&mut self, now: Duration) -> Option<FiredTimer> {
        let (deadline, id) = self.queue.first_key_value().map(|(key, _)| *key)?;
        if deadline > now {
            return None;
        }

        let kind = self.queue.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        Some(FiredTimer { id, kind, deadline })
    }

    /// Number of pending timers matching `predicate`.
    pub fn pending(&self, predicate: impl Fn(&TimerKind) -> bool) -> usize {
        self.queue.values().filter(|kind| predicate(kind)).count()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let mut timers = Timers::new();
        let late = timers.schedule(secs(0), secs(5), TimerKind::Reconnect);
        let early = timers.schedule(secs(0), secs(2), TimerKind::LivenessCheck);

        assert_eq!(timers.next_deadline(), Some(secs(2)));
        assert!(timers.pop_due(secs(1)).is_none());

        let first = timers.pop_due(secs(10)).unwrap();
        assert_eq!(first.id, early);
        assert_eq!(first.deadline, secs(2));

        let second = timers.pop_due(secs(10)).unwrap();
        assert_eq!(second.id, late);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_equal_deadlines_fire_in_scheduling_order() {
        let mut timers = Timers::new();
        let a = timers.schedule(secs(0), secs(3), TimerKind::Reconnect);
        let b = timers.schedule(secs(1), secs(2), TimerKind::LivenessCheck);

        assert_eq!(timers.pop_due(secs(3)).unwrap().id, a);
        assert_eq!(timers.pop_due(secs(3)).unwrap().id, b);
    }

    #[test]
    fn test_canceled_timer_never_fires() {
        let mut timers = Timers::new();
        let id = timers.schedule(secs(0), secs(1), TimerKind::AutoClose { session: 1 });

        assert!(timers.is_pending(id));
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(!timers.is_pending(id));
        assert!(timers.pop_due(secs(60)).is_none());
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_pending_counts_by_kind() {
        let mut timers = Timers::new();
        timers.schedule(secs(0), secs(1), TimerKind::PhaseAdvance { session: 1 });
        timers.schedule(secs(0), secs(1), TimerKind::AutoClose { session: 1 });
        timers.schedule(secs(0), secs(1), TimerKind::Reconnect);

        assert_eq!(timers.pending(|k| matches!(k, TimerKind::Reconnect)), 1);
        assert_eq!(
            timers.pending(|k| matches!(
                k,
                TimerKind::PhaseAdvance { .. } | TimerKind::AutoClose { .. }
            )),
            2
        );
        assert_eq!(timers.len(), 3);
    }
}
