//! Read-only checks over simulation state.
//!
//! Every check returns `Ok(())` or an [`ExpectationFailure`] that carries
//! both what was expected and what was observed.

use crate::association::AssociationStore;
use crate::clock::VirtualClock;
use crate::matchers::{self, Matcher};
use crate::scheduler::{ScheduledTrigger, TriggerScheduler};

use saga_env::{AssociationValue, CommandMessage, EventMessage};
use serde_json::Value;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// A failed expectation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{expectation}: expected {expected}, but got {actual}")]
pub struct ExpectationFailure {
    /// Which check failed
    pub expectation: &'static str,
    pub expected: String,
    pub actual: String,
}

impl ExpectationFailure {
    fn new(
        expectation: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            expectation,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

type Check = Result<(), ExpectationFailure>;

/// Snapshot view used to evaluate expectations.
pub struct ExpectationEvaluator<'a> {
    clock: &'a VirtualClock,
    scheduler: &'a TriggerScheduler,
    active_sagas: usize,
    associations: &'a AssociationStore,
    commands: &'a [CommandMessage],
    events: &'a [EventMessage],
}

impl<'a> ExpectationEvaluator<'a> {
    pub fn new(
        clock: &'a VirtualClock,
        scheduler: &'a TriggerScheduler,
        active_sagas: usize,
        associations: &'a AssociationStore,
        commands: &'a [CommandMessage],
        events: &'a [EventMessage],
    ) -> Self {
        Self {
            clock,
            scheduler,
            active_sagas,
            associations,
            commands,
            events,
        }
    }

    /// Checks the number of active saga instances.
    pub fn active_sagas(&self, expected: usize) -> Check {
        if self.active_sagas == expected {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "active sagas",
            format!("{} active saga(s)", expected),
            format!("{} active saga(s)", self.active_sagas),
        ))
    }

    /// Checks that some active instance holds `key=value`.
    pub fn association_with(&self, key: &str, value: &str) -> Check {
        let wanted = AssociationValue::new(key, value);
        if self.associations.contains(&wanted) {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "association",
            format!("a saga associated with {}", wanted),
            self.describe_associations(),
        ))
    }

    /// Checks that no active instance holds `key=value`.
    pub fn no_association_with(&self, key: &str, value: &str) -> Check {
        let unwanted = AssociationValue::new(key, value);
        let holders = self.associations.instances_for(&unwanted);
        if holders.is_empty() {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "no association",
            format!("no saga associated with {}", unwanted),
            format!("{} saga(s) associated with {}", holders.len(), unwanted),
        ))
    }

    /// Checks for a trigger due `delay` from now whose payload equals `event`'s.
    pub fn scheduled_event(&self, delay: Duration, event: &EventMessage) -> Check {
        let due = self.due_after(delay)?;
        self.scheduled_event_at(due, event)
    }

    /// Checks for a trigger due at `time` whose payload equals `event`'s.
    pub fn scheduled_event_at(&self, time: SystemTime, event: &EventMessage) -> Check {
        let expected = event.clone();
        let matcher = Matcher::new(
            format!("{} {}", event.payload_type, event.payload),
            move |e: &EventMessage| e.same_payload(&expected),
        );
        self.scheduled_event_matching_at(time, &matcher)
    }

    /// Checks for a trigger due `delay` from now with a payload of type `T`.
    pub fn scheduled_event_of_type<T: ?Sized + 'static>(&self, delay: Duration) -> Check {
        let due = self.due_after(delay)?;
        self.scheduled_event_of_type_at::<T>(due)
    }

    /// Checks for a trigger due at `time` with a payload of type `T`.
    pub fn scheduled_event_of_type_at<T: ?Sized + 'static>(&self, time: SystemTime) -> Check {
        self.scheduled_event_matching_at(time, &matchers::payload_of_type::<EventMessage, T>())
    }

    /// Checks for a trigger due `delay` from now whose payload satisfies `matcher`.
    pub fn scheduled_event_matching(
        &self,
        delay: Duration,
        matcher: &Matcher<EventMessage>,
    ) -> Check {
        let due = self.due_after(delay)?;
        self.scheduled_event_matching_at(due, matcher)
    }

    /// Checks for a trigger due at `time` whose payload satisfies `matcher`.
    pub fn scheduled_event_matching_at(
        &self,
        time: SystemTime,
        matcher: &Matcher<EventMessage>,
    ) -> Check {
        let found = self
            .scheduler
            .pending()
            .any(|t| t.due_time == time && matcher.matches(&t.payload));
        if found {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "scheduled event",
            format!("{} due {}", matcher.description(), self.describe_time(time)),
            self.describe_pending(),
        ))
    }

    /// Checks that nothing is pending.
    pub fn no_scheduled_events(&self) -> Check {
        if self.scheduler.is_empty() {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "no scheduled events",
            "no scheduled events",
            self.describe_pending(),
        ))
    }

    /// Checks the recorded command payloads, in dispatch order.
    pub fn dispatched_commands_equal_to(&self, expected: &[Value]) -> Check {
        let actual: Vec<&Value> = self.commands.iter().map(|c| &c.payload).collect();
        if actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, e)| *a == e) {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "dispatched commands",
            describe_values(expected.iter()),
            describe_values(actual.into_iter()),
        ))
    }

    /// Checks the recorded commands against a list matcher.
    pub fn dispatched_commands_matching(&self, matcher: &Matcher<[CommandMessage]>) -> Check {
        if matcher.matches(self.commands) {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "dispatched commands",
            matcher.description(),
            describe_values(self.commands.iter().map(|c| &c.payload)),
        ))
    }

    /// Checks that nothing was dispatched.
    pub fn no_dispatched_commands(&self) -> Check {
        if self.commands.is_empty() {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "no dispatched commands",
            "no commands",
            describe_values(self.commands.iter().map(|c| &c.payload)),
        ))
    }

    /// Checks the recorded events, in publication order, by type and payload.
    pub fn published_events(&self, expected: &[EventMessage]) -> Check {
        let same = self.events.len() == expected.len()
            && self.events.iter().zip(expected).all(|(a, e)| a.same_payload(e));
        if same {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "published events",
            describe_events(expected),
            describe_events(self.events),
        ))
    }

    /// Checks the recorded events against a list matcher.
    pub fn published_events_matching(&self, matcher: &Matcher<[EventMessage]>) -> Check {
        if matcher.matches(self.events) {
            return Ok(());
        }
        Err(ExpectationFailure::new(
            "published events",
            matcher.description(),
            describe_events(self.events),
        ))
    }

    /// Checks that nothing was published.
    pub fn no_published_events(&self) -> Check {
        self.published_events_matching(&matchers::no_events())
    }

    fn due_after(&self, delay: Duration) -> Result<SystemTime, ExpectationFailure> {
        self.clock.now().checked_add(delay).ok_or_else(|| {
            ExpectationFailure::new(
                "scheduled event",
                format!("a trigger due in {:?}", delay),
                "a delay past the end of representable time",
            )
        })
    }

    fn describe_time(&self, time: SystemTime) -> String {
        match time.duration_since(self.clock.now()) {
            Ok(ahead) => format!("in {:?}", ahead),
            Err(e) => format!("{:?} ago", e.duration()),
        }
    }

    fn describe_pending(&self) -> String {
        if self.scheduler.is_empty() {
            return "no scheduled events".to_string();
        }
        let pending: Vec<String> = self
            .scheduler
            .pending()
            .map(|t: &ScheduledTrigger| {
                format!(
                    "{} {} due {}",
                    t.token,
                    short_name(&t.payload.payload_type),
                    self.describe_time(t.due_time)
                )
            })
            .collect();
        format!("[{}]", pending.join(", "))
    }

    fn describe_associations(&self) -> String {
        let values: Vec<String> = self
            .associations
            .all_associations()
            .values()
            .flatten()
            .map(ToString::to_string)
            .collect();
        if values.is_empty() {
            "no associations".to_string()
        } else {
            format!("[{}]", values.join(", "))
        }
    }
}

/// Strips the module path from a type tag for readable output.
fn short_name(tag: &str) -> &str {
    let base = tag.split('<').next().unwrap_or(tag);
    let start = base.rfind("::").map(|i| i + 2).unwrap_or(0);
    &tag[start..]
}

fn describe_values<'v>(values: impl Iterator<Item = &'v Value>) -> String {
    let parts: Vec<String> = values.map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

fn describe_events(events: &[EventMessage]) -> String {
    let parts: Vec<String> = events
        .iter()
        .map(|e| format!("{} {}", short_name(&e.payload_type), e.payload))
        .collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::default_epoch;
    use saga_env::SagaId;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Expired {
        id: String,
    }

    #[derive(Serialize)]
    struct Renewed {
        id: String,
    }

    fn expired(id: &str) -> EventMessage {
        EventMessage::new(Expired { id: id.into() }).unwrap()
    }

    struct State {
        clock: VirtualClock,
        scheduler: TriggerScheduler,
        associations: AssociationStore,
        commands: Vec<CommandMessage>,
        events: Vec<EventMessage>,
    }

    impl State {
        fn new() -> Self {
            let mut clock = VirtualClock::default();
            clock.advance_by(Duration::from_secs(100)).unwrap();

            let mut scheduler = TriggerScheduler::new();
            scheduler.schedule(clock.now() + Duration::from_secs(600), expired("a"));

            let mut associations = AssociationStore::new();
            associations.associate(SagaId::from_seed(1), AssociationValue::new("id", "a"));

            Self {
                clock,
                scheduler,
                associations,
                commands: vec![CommandMessage::new("Say hi!".to_string()).unwrap()],
                events: vec![EventMessage::new(Renewed { id: "a".into() }).unwrap()],
            }
        }

        fn evaluator(&self) -> ExpectationEvaluator<'_> {
            ExpectationEvaluator::new(
                &self.clock,
                &self.scheduler,
                1,
                &self.associations,
                &self.commands,
                &self.events,
            )
        }
    }

    #[test]
    fn test_active_sagas() {
        let state = State::new();
        assert!(state.evaluator().active_sagas(1).is_ok());

        let err = state.evaluator().active_sagas(2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "active sagas: expected 2 active saga(s), but got 1 active saga(s)"
        );
    }

    #[test]
    fn test_associations() {
        let state = State::new();
        let eval = state.evaluator();
        assert!(eval.association_with("id", "a").is_ok());
        assert!(eval.association_with("id", "b").is_err());
        assert!(eval.no_association_with("id", "b").is_ok());

        let err = eval.no_association_with("id", "a").unwrap_err();
        assert_eq!(err.actual, "1 saga(s) associated with id=a");
    }

    #[test]
    fn test_scheduled_event_relative_and_absolute() {
        let state = State::new();
        let eval = state.evaluator();
        let due = default_epoch() + Duration::from_secs(700);

        assert!(eval.scheduled_event(Duration::from_secs(600), &expired("a")).is_ok());
        assert!(eval.scheduled_event_at(due, &expired("a")).is_ok());
        assert!(eval.scheduled_event_of_type::<Expired>(Duration::from_secs(600)).is_ok());
        assert!(eval.scheduled_event_of_type_at::<Expired>(due).is_ok());

        assert!(eval.scheduled_event(Duration::from_secs(600), &expired("b")).is_err());
        assert!(eval.scheduled_event_of_type::<Renewed>(Duration::from_secs(600)).is_err());
        let err = eval.scheduled_event_of_type::<Expired>(Duration::from_secs(599)).unwrap_err();
        assert!(err.actual.contains("Expired"));
        assert!(err.actual.contains("600s"));
    }

    #[test]
    fn test_scheduled_event_matching() {
        let state = State::new();
        let eval = state.evaluator();
        let for_a = matchers::payload_equal_to::<EventMessage>(json!({ "id": "a" }));
        assert!(eval.scheduled_event_matching(Duration::from_secs(600), &for_a).is_ok());
        assert!(eval.no_scheduled_events().is_err());

        let empty = TriggerScheduler::new();
        let eval =
            ExpectationEvaluator::new(&state.clock, &empty, 0, &state.associations, &[], &[]);
        assert!(eval.no_scheduled_events().is_ok());
        assert!(eval.scheduled_event_matching(Duration::ZERO, &matchers::any()).is_err());
    }

    #[test]
    fn test_dispatched_commands() {
        let state = State::new();
        let eval = state.evaluator();
        assert!(eval.dispatched_commands_equal_to(&[json!("Say hi!")]).is_ok());
        assert!(eval.dispatched_commands_equal_to(&[]).is_err());
        assert!(eval.no_dispatched_commands().is_err());

        let list =
            matchers::list_with_any_of(vec![matchers::payload_of_type::<CommandMessage, String>()]);
        assert!(eval.dispatched_commands_matching(&list).is_ok());

        let err = eval.dispatched_commands_equal_to(&[json!("Bye")]).unwrap_err();
        assert_eq!(err.expected, "[\"Bye\"]");
        assert_eq!(err.actual, "[\"Say hi!\"]");
    }

    #[test]
    fn test_published_events() {
        let state = State::new();
        let eval = state.evaluator();
        let renewed = EventMessage::new(Renewed { id: "a".into() }).unwrap();

        assert!(eval.published_events(&[renewed]).is_ok());
        assert!(eval.published_events(&[expired("a")]).is_err());
        assert!(eval.no_published_events().is_err());
        assert!(eval
            .published_events_matching(&matchers::exact_sequence_of(vec![
                matchers::payload_of_type::<EventMessage, Renewed>()
            ]))
            .is_ok());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("my_crate::events::Expired"), "Expired");
        assert_eq!(short_name("alloc::string::String"), "String");
        assert_eq!(short_name("Plain"), "Plain");
    }
}
