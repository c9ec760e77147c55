//! Capabilities a saga instance may use while handling an event.

use crate::error::{SagaError, SagaResult};
use crate::message::{type_tag, CommandMessage, EventMessage};
use crate::types::{AssociationValue, SagaId, ScheduleToken};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, SystemTime};

/// The central interface between a saga instance and its environment.
///
/// A fresh context is handed to every handler invocation and is scoped to
/// the instance being invoked: association changes and `end()` apply to that
/// instance only.
///
/// # Implementations
///
/// - **Simulation**: `saga_sim`'s handler context, backed by a virtual clock,
///   an in-memory trigger scheduler and a recording command interceptor
///
/// # Determinism
///
/// Nothing here blocks. Deferred work is expressed as scheduled triggers,
/// and time is whatever the environment says it is.
pub trait SagaContext {
    /// Identifier of the instance being invoked.
    fn saga_id(&self) -> SagaId;

    /// Returns the current time.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> SystemTime;

    /// Adds an association value to this instance.
    fn associate_with(&mut self, value: AssociationValue);

    /// Removes an association value from this instance.
    fn remove_association(&mut self, value: &AssociationValue);

    /// Schedules `event` for delivery `delay` after now.
    fn schedule_after(&mut self, delay: Duration, event: EventMessage) -> ScheduleToken;

    /// Schedules `event` for delivery at an absolute time.
    ///
    /// A time in the past is treated as "now": the event fires on the next
    /// advance of the clock.
    fn schedule_at(&mut self, at: SystemTime, event: EventMessage) -> ScheduleToken;

    /// Cancels a scheduled trigger.
    ///
    /// Cancelling a token that already fired or was already cancelled is a
    /// no-op.
    fn cancel_schedule(&mut self, token: ScheduleToken);

    /// Publishes an event on the bus.
    fn publish(&mut self, event: EventMessage);

    /// Dispatches a command on the command bus and returns its response.
    fn send(&mut self, command: CommandMessage) -> SagaResult<Value>;

    /// Dispatches a command through a named command gateway.
    fn send_via(&mut self, gateway: &str, command: CommandMessage) -> SagaResult<Value>;

    /// Signals that this instance has finished.
    ///
    /// The instance is retired once the current handler returns.
    fn end(&mut self);
}

/// Typed helpers over [`SagaContext`].
pub trait SagaContextExt: SagaContext {
    /// Encodes and publishes a payload.
    fn publish_payload<E: Serialize + 'static>(&mut self, payload: E) -> SagaResult<()> {
        let event = EventMessage::new(payload)?;
        self.publish(event);
        Ok(())
    }

    /// Encodes and schedules a payload after `delay`.
    fn schedule_payload_after<E: Serialize + 'static>(
        &mut self,
        delay: Duration,
        payload: E,
    ) -> SagaResult<ScheduleToken> {
        let event = EventMessage::new(payload)?;
        Ok(self.schedule_after(delay, event))
    }

    /// Sends a payload through a gateway and decodes the response.
    ///
    /// A `null` response decodes as `None`.
    fn send_payload_via<C, R>(&mut self, gateway: &str, payload: C) -> SagaResult<Option<R>>
    where
        C: Serialize + 'static,
        R: DeserializeOwned + 'static,
    {
        let command = CommandMessage::new(payload)?;
        let response = self.send_via(gateway, command)?;
        serde_json::from_value::<Option<R>>(response).map_err(|e| SagaError::Decode {
            payload_type: format!("response to {}", type_tag::<C>()),
            target: type_tag::<R>(),
            reason: e.to_string(),
        })
    }
}

impl<T: SagaContext + ?Sized> SagaContextExt for T {}
