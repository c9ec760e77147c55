//! Described predicates for expectations.
//!
//! A [`Matcher`] pairs a predicate with a human-readable description, so a
//! failing expectation can say what it was looking for.

use saga_env::{type_tag, Message};
use serde_json::Value;

/// A predicate over `T` that can describe itself.
pub struct Matcher<T: ?Sized> {
    description: String,
    predicate: Box<dyn Fn(&T) -> bool>,
}

impl<T: ?Sized> Matcher<T> {
    /// Creates a matcher from a description and a predicate.
    pub fn new(description: impl Into<String>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, item: &T) -> bool {
        (self.predicate)(item)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<T: ?Sized> std::fmt::Debug for Matcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Matcher({})", self.description)
    }
}

/// Matches anything.
pub fn any<T: ?Sized + 'static>() -> Matcher<T> {
    Matcher::new("anything", |_| true)
}

/// Matches messages whose payload was built from a `P`.
pub fn payload_of_type<M: Message + 'static, P: ?Sized + 'static>() -> Matcher<M> {
    let tag = type_tag::<P>();
    Matcher::new(format!("message with payload of type {}", tag), move |m: &M| {
        m.payload_type() == tag
    })
}

/// Matches messages whose encoded payload equals `payload`.
pub fn payload_equal_to<M: Message + 'static>(payload: Value) -> Matcher<M> {
    Matcher::new(format!("message with payload {}", payload), move |m: &M| {
        *m.payload() == payload
    })
}

/// Matches messages whose payload satisfies `inner`.
pub fn message_with_payload<M: Message + 'static>(inner: Matcher<Value>) -> Matcher<M> {
    let description = format!("message with payload {}", inner.description());
    Matcher::new(description, move |m: &M| inner.matches(m.payload()))
}

/// Matches an empty list.
pub fn no_events<M: 'static>() -> Matcher<[M]> {
    Matcher::new("no events", |items: &[M]| items.is_empty())
}

/// Matches an empty list of commands.
pub fn no_commands<M: 'static>() -> Matcher<[M]> {
    Matcher::new("no commands", |items: &[M]| items.is_empty())
}

/// Matches a list in which at least one item satisfies any of `matchers`.
pub fn list_with_any_of<M: 'static>(matchers: Vec<Matcher<M>>) -> Matcher<[M]> {
    let description = format!("list with any of [{}]", describe_all(&matchers));
    Matcher::new(description, move |items: &[M]| {
        matchers.iter().any(|m| items.iter().any(|item| m.matches(item)))
    })
}

/// Matches a list in which every one of `matchers` is satisfied by some item.
pub fn list_with_all_of<M: 'static>(matchers: Vec<Matcher<M>>) -> Matcher<[M]> {
    let description = format!("list with all of [{}]", describe_all(&matchers));
    Matcher::new(description, move |items: &[M]| {
        matchers.iter().all(|m| items.iter().any(|item| m.matches(item)))
    })
}

/// Matches a list whose items satisfy `matchers` one to one, in order.
pub fn exact_sequence_of<M: 'static>(matchers: Vec<Matcher<M>>) -> Matcher<[M]> {
    let description = format!("exact sequence of [{}]", describe_all(&matchers));
    Matcher::new(description, move |items: &[M]| {
        items.len() == matchers.len() && matchers.iter().zip(items).all(|(m, item)| m.matches(item))
    })
}

/// Matches a list containing items satisfying `matchers` in order, with
/// other items allowed in between.
pub fn sequence_of<M: 'static>(matchers: Vec<Matcher<M>>) -> Matcher<[M]> {
    let description = format!("sequence of [{}]", describe_all(&matchers));
    Matcher::new(description, move |items: &[M]| {
        let mut remaining = items.iter();
        matchers
            .iter()
            .all(|m| remaining.by_ref().any(|item| m.matches(item)))
    })
}

fn describe_all<T: ?Sized>(matchers: &[Matcher<T>]) -> String {
    matchers
        .iter()
        .map(|m| m.description())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_env::EventMessage;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Started {
        id: u32,
    }

    #[derive(Serialize)]
    struct Stopped {
        id: u32,
    }

    fn started(id: u32) -> EventMessage {
        EventMessage::new(Started { id }).unwrap()
    }

    fn stopped(id: u32) -> EventMessage {
        EventMessage::new(Stopped { id }).unwrap()
    }

    #[test]
    fn test_payload_of_type() {
        let m = payload_of_type::<EventMessage, Started>();
        assert!(m.matches(&started(1)));
        assert!(!m.matches(&stopped(1)));
        assert!(m.description().contains("Started"));
    }

    #[test]
    fn test_payload_equal_to() {
        let m = payload_equal_to::<EventMessage>(serde_json::json!({ "id": 2 }));
        assert!(m.matches(&started(2)));
        assert!(m.matches(&stopped(2)));
        assert!(!m.matches(&started(3)));
    }

    #[test]
    fn test_list_matchers() {
        let events = vec![started(1), stopped(1), started(2)];

        let stopped = list_with_any_of(vec![payload_of_type::<EventMessage, Stopped>()]);
        assert!(stopped.matches(&events));
        assert!(!no_events().matches(&events[..]));
        assert!(no_events::<EventMessage>().matches(&[]));
        assert!(list_with_all_of(vec![
            payload_of_type::<EventMessage, Started>(),
            payload_of_type::<EventMessage, Stopped>(),
        ])
        .matches(&events));
    }

    #[test]
    fn test_sequence_matchers() {
        let events = vec![started(1), stopped(1), started(2)];
        let start = || payload_of_type::<EventMessage, Started>();
        let stop = || payload_of_type::<EventMessage, Stopped>();

        assert!(exact_sequence_of(vec![start(), stop(), start()]).matches(&events));
        assert!(!exact_sequence_of(vec![start(), stop()]).matches(&events));
        assert!(sequence_of(vec![start(), start()]).matches(&events));
        assert!(!sequence_of(vec![stop(), stop()]).matches(&events));
    }

    #[test]
    fn test_message_with_payload() {
        let m = message_with_payload::<EventMessage>(Matcher::new("id above 5", |v: &Value| {
            v.get("id").and_then(Value::as_u64).map(|id| id > 5).unwrap_or(false)
        }));
        assert!(m.matches(&started(6)));
        assert!(!m.matches(&started(5)));
        assert_eq!(m.description(), "message with payload id above 5");
    }
}
