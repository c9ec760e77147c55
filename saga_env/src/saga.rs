//! The saga contract and its static handler table.
//!
//! A saga type declares, once, which event types it handles, how each event
//! correlates to instances, and whether it may start a new instance. The
//! harness builds the table when the saga type is registered and looks
//! handlers up by the event's type tag from then on.

use crate::context::SagaContext;
use crate::error::SagaResult;
use crate::message::{type_tag, EventMessage};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// When handling an event may create a new saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SagaCreationPolicy {
    /// Only existing instances receive the event
    #[default]
    Never,

    /// A new instance is created when no existing instance matches
    IfNoneFound,

    /// A new instance is always created, in addition to any that match
    Always,
}

type ExtractFn = Box<dyn Fn(&EventMessage) -> SagaResult<String>>;
type HandlerFn<S> = Box<dyn Fn(&mut S, &EventMessage, &mut dyn SagaContext) -> SagaResult<()>>;

/// A correlation key and the function extracting its value from an event.
pub struct Correlation {
    key: String,
    extract: ExtractFn,
}

impl Correlation {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Extracts the association value for `event`.
    pub fn extract(&self, event: &EventMessage) -> SagaResult<String> {
        (self.extract)(event)
    }
}

/// Handling behavior registered for one event type.
pub struct EventHandler<S> {
    policy: SagaCreationPolicy,
    correlations: Vec<Correlation>,
    handle: HandlerFn<S>,
}

impl<S> EventHandler<S> {
    pub fn policy(&self) -> SagaCreationPolicy {
        self.policy
    }

    /// Declared correlation keys, in declaration order.
    pub fn correlations(&self) -> &[Correlation] {
        &self.correlations
    }

    /// Invokes the handler on one instance.
    pub fn invoke(
        &self,
        saga: &mut S,
        event: &EventMessage,
        ctx: &mut dyn SagaContext,
    ) -> SagaResult<()> {
        (self.handle)(saga, event, ctx)
    }
}

/// Static mapping from event type tag to handling behavior.
pub struct HandlerTable<S> {
    handlers: HashMap<&'static str, EventHandler<S>>,
}

impl<S: 'static> HandlerTable<S> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for events of type `E` routed to existing instances.
    ///
    /// # Arguments
    /// * `key` - Association key the event correlates on
    /// * `extract` - Pulls the association value out of the event
    /// * `handle` - The handling logic
    pub fn on<E, K, H>(&mut self, key: &str, extract: K, handle: H) -> &mut Self
    where
        E: DeserializeOwned + 'static,
        K: Fn(&E) -> String + 'static,
        H: Fn(&mut S, E, &mut dyn SagaContext) -> SagaResult<()> + 'static,
    {
        self.register(SagaCreationPolicy::Never, key, extract, handle)
    }

    /// Registers a handler for events of type `E` that start a new instance
    /// when no existing instance matches.
    pub fn start_on<E, K, H>(&mut self, key: &str, extract: K, handle: H) -> &mut Self
    where
        E: DeserializeOwned + 'static,
        K: Fn(&E) -> String + 'static,
        H: Fn(&mut S, E, &mut dyn SagaContext) -> SagaResult<()> + 'static,
    {
        self.register(SagaCreationPolicy::IfNoneFound, key, extract, handle)
    }

    /// Registers a handler with an explicit creation policy.
    ///
    /// A later registration for the same event type replaces the earlier one.
    pub fn register<E, K, H>(
        &mut self,
        policy: SagaCreationPolicy,
        key: &str,
        extract: K,
        handle: H,
    ) -> &mut Self
    where
        E: DeserializeOwned + 'static,
        K: Fn(&E) -> String + 'static,
        H: Fn(&mut S, E, &mut dyn SagaContext) -> SagaResult<()> + 'static,
    {
        let handle: HandlerFn<S> = Box::new(
            move |saga: &mut S, message: &EventMessage, ctx: &mut dyn SagaContext| {
                let event = message.decode::<E>()?;
                handle(saga, event, ctx)
            },
        );

        self.handlers.insert(
            type_tag::<E>(),
            EventHandler {
                policy,
                correlations: vec![Self::correlation::<E, K>(key, extract)],
                handle,
            },
        );
        self
    }

    /// Declares an additional correlation key for an already registered event type.
    ///
    /// Events then route to the union of instances matching any declared key.
    /// Declaring a key for an unregistered event type has no effect.
    pub fn correlate<E, K>(&mut self, key: &str, extract: K) -> &mut Self
    where
        E: DeserializeOwned + 'static,
        K: Fn(&E) -> String + 'static,
    {
        if let Some(handler) = self.handlers.get_mut(type_tag::<E>()) {
            handler.correlations.push(Self::correlation::<E, K>(key, extract));
        }
        self
    }

    fn correlation<E, K>(key: &str, extract: K) -> Correlation
    where
        E: DeserializeOwned + 'static,
        K: Fn(&E) -> String + 'static,
    {
        Correlation {
            key: key.to_string(),
            extract: Box::new(move |message: &EventMessage| {
                message.decode::<E>().map(|event| extract(&event))
            }),
        }
    }

    /// Looks up the handler for an event type tag.
    pub fn handler_for(&self, payload_type: &str) -> Option<&EventHandler<S>> {
        self.handlers.get(payload_type)
    }

    /// Number of registered event types.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S: 'static> Default for HandlerTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A saga type under test.
///
/// Instances start from `Default` and receive events through the handlers
/// the type declares in [`Saga::handlers`].
pub trait Saga: Default + 'static {
    /// Declares the handlers of this saga type.
    fn handlers(table: &mut HandlerTable<Self>);

    /// Builds the handler table for this saga type.
    fn handler_table() -> HandlerTable<Self> {
        let mut table = HandlerTable::new();
        Self::handlers(&mut table);
        table
    }
}
