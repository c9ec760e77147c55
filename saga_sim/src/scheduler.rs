//! Deterministic trigger scheduler.
//!
//! Pending triggers are kept in a `BTreeMap` keyed by `(due_time, token)`.
//! Tokens are strictly increasing, so triggers due at the same instant pop
//! in scheduling order. A side index from token to due time makes
//! cancellation O(log n).

use saga_env::{EventMessage, ScheduleToken};
use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;
use tracing::debug;

/// A deferred event waiting for the clock to reach its due time.
#[derive(Debug, Clone)]
pub struct ScheduledTrigger {
    pub token: ScheduleToken,
    pub due_time: SystemTime,
    pub payload: EventMessage,
}

/// Holds pending triggers keyed by cancellation token.
#[derive(Debug, Default)]
pub struct TriggerScheduler {
    /// Pending triggers in firing order
    queue: BTreeMap<(SystemTime, ScheduleToken), ScheduledTrigger>,

    /// Token -> due time, for cancellation
    index: HashMap<ScheduleToken, SystemTime>,

    /// Next token to hand out
    next_token: u64,
}

impl TriggerScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `payload` for `due_time` and returns its token.
    pub fn schedule(&mut self, due_time: SystemTime, payload: EventMessage) -> ScheduleToken {
        let token = self.mint_token();
        debug!("Scheduled {} ({}) for {:?}", token, payload.payload_type, due_time);
        self.index.insert(token, due_time);
        self.queue.insert(
            (due_time, token),
            ScheduledTrigger {
                token,
                due_time,
                payload,
            },
        );
        token
    }

    /// Hands out a fresh token without scheduling anything.
    pub(crate) fn mint_token(&mut self) -> ScheduleToken {
        let token = ScheduleToken::new(self.next_token);
        self.next_token += 1;
        token
    }

    /// Cancels a pending trigger.
    ///
    /// Returns false when the token already fired or was already cancelled;
    /// that is not an error.
    pub fn cancel(&mut self, token: ScheduleToken) -> bool {
        match self.index.remove(&token) {
            Some(due_time) => {
                self.queue.remove(&(due_time, token));
                debug!("Cancelled {}", token);
                true
            }
            None => {
                debug!("Cancel of {} ignored: no longer pending", token);
                false
            }
        }
    }

    /// Removes and returns the earliest trigger due at or before `time`.
    pub fn pop_due(&mut self, time: SystemTime) -> Option<ScheduledTrigger> {
        let (&(due_time, token), _) = self.queue.first_key_value()?;
        if due_time > time {
            return None;
        }
        self.index.remove(&token);
        self.queue.remove(&(due_time, token))
    }

    /// Returns the earliest pending trigger without removing it.
    pub fn peek_next(&self) -> Option<&ScheduledTrigger> {
        self.queue.values().next()
    }

    /// Iterates pending triggers in firing order.
    pub fn pending(&self) -> impl Iterator<Item = &ScheduledTrigger> {
        self.queue.values()
    }

    /// Returns true if `token` is still pending.
    pub fn is_pending(&self, token: ScheduleToken) -> bool {
        self.index.contains_key(&token)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of pending triggers.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::default_epoch;
    use proptest::prelude::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        default_epoch() + Duration::from_secs(secs)
    }

    fn label(text: &str) -> EventMessage {
        EventMessage::new(text.to_string()).unwrap()
    }

    fn drain(sched: &mut TriggerScheduler, time: SystemTime) -> Vec<ScheduledTrigger> {
        std::iter::from_fn(|| sched.pop_due(time)).collect()
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut sched = TriggerScheduler::new();
        sched.schedule(at(10), label("first"));
        sched.schedule(at(10), label("second"));
        sched.schedule(at(10), label("third"));

        let fired = drain(&mut sched, at(10));
        let labels: Vec<String> = fired.iter().map(|t| t.payload.decode().unwrap()).collect();
        assert_eq!(labels, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = TriggerScheduler::new();
        sched.schedule(at(30), label("late"));
        sched.schedule(at(10), label("early"));
        sched.schedule(at(20), label("mid"));

        let fired = drain(&mut sched, at(60));
        let due: Vec<SystemTime> = fired.iter().map(|t| t.due_time).collect();
        assert_eq!(due, vec![at(10), at(20), at(30)]);
    }

    #[test]
    fn test_pop_due_stops_at_time() {
        let mut sched = TriggerScheduler::new();
        sched.schedule(at(5), label("a"));
        sched.schedule(at(15), label("b"));

        assert_eq!(drain(&mut sched, at(10)).len(), 1);
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.peek_next().map(|t| t.due_time), Some(at(15)));
    }

    #[test]
    fn test_cancel_removes_trigger() {
        let mut sched = TriggerScheduler::new();
        let keep = sched.schedule(at(5), label("keep"));
        let drop = sched.schedule(at(5), label("drop"));

        assert!(sched.cancel(drop));
        assert!(!sched.is_pending(drop));
        assert!(sched.is_pending(keep));

        let fired = drain(&mut sched, at(5));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].token, keep);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut sched = TriggerScheduler::new();
        let token = sched.schedule(at(1), label("once"));
        assert_eq!(drain(&mut sched, at(1)).len(), 1);

        assert!(!sched.cancel(token));
        assert!(!sched.cancel(token));
        assert!(sched.is_empty());
    }

    #[test]
    fn test_tokens_never_reused() {
        let mut sched = TriggerScheduler::new();
        let first = sched.schedule(at(1), label("x"));
        sched.cancel(first);
        let second = sched.schedule(at(1), label("y"));
        assert_ne!(first, second);
        assert!(second > first);
    }

    proptest! {
        #[test]
        fn prop_fires_in_due_order_with_fifo_ties(
            offsets in proptest::collection::vec(0u64..50, 1..40),
        ) {
            let mut sched = TriggerScheduler::new();
            for (i, offset) in offsets.iter().enumerate() {
                sched.schedule(at(*offset), label(&i.to_string()));
            }

            let fired = drain(&mut sched, at(100));
            prop_assert_eq!(fired.len(), offsets.len());
            for window in fired.windows(2) {
                let (a, b) = (&window[0], &window[1]);
                prop_assert!((a.due_time, a.token) < (b.due_time, b.token));
            }
            prop_assert!(sched.is_empty());
        }
    }
}
