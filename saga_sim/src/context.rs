//! Simulation context implementing SagaContext for deterministic testing.

use crate::association::AssociationStore;
use crate::clock::VirtualClock;
use crate::gateway::CommandGatewayInterceptor;
use crate::scheduler::TriggerScheduler;

use saga_env::{
    AssociationValue, CommandBus, CommandMessage, EventMessage, SagaContext, SagaId, SagaResult,
    ScheduleToken,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// The parts of the world a handler may touch, borrowed for one routing pass.
pub(crate) struct Collaborators<'w> {
    pub(crate) clock: &'w VirtualClock,
    pub(crate) scheduler: &'w mut TriggerScheduler,
    pub(crate) commands: &'w mut CommandGatewayInterceptor,

    /// Events published by handlers, delivered after the current handler returns
    pub(crate) outbox: &'w mut VecDeque<EventMessage>,
}

/// Simulation context handed to one handler invocation.
///
/// This implements `SagaContext` using:
/// - The world's virtual clock for `now()` and relative scheduling
/// - The trigger scheduler for deferred events
/// - The recording command interceptor for dispatch
/// - An outbox for published events, so nothing re-enters the registry while
///   an instance is borrowed
pub(crate) struct SimContext<'a, 'w> {
    saga_id: SagaId,
    associations: &'a mut AssociationStore,
    world: &'a mut Collaborators<'w>,
    ended: bool,
}

impl<'a, 'w> SimContext<'a, 'w> {
    pub(crate) fn new(
        saga_id: SagaId,
        associations: &'a mut AssociationStore,
        world: &'a mut Collaborators<'w>,
    ) -> Self {
        Self {
            saga_id,
            associations,
            world,
            ended: false,
        }
    }

    /// Returns true if the handler called `end()`.
    pub(crate) fn ended(&self) -> bool {
        self.ended
    }
}

impl SagaContext for SimContext<'_, '_> {
    fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    fn now(&self) -> SystemTime {
        self.world.clock.now()
    }

    fn associate_with(&mut self, value: AssociationValue) {
        self.associations.associate(self.saga_id, value);
    }

    fn remove_association(&mut self, value: &AssociationValue) {
        self.associations.disassociate(self.saga_id, value);
    }

    fn schedule_after(&mut self, delay: Duration, event: EventMessage) -> ScheduleToken {
        match self.world.clock.now().checked_add(delay) {
            Some(due) => self.world.scheduler.schedule(due, event),
            // Past the end of representable time: the trigger can never fire.
            None => {
                let token = self.world.scheduler.mint_token();
                warn!(
                    "Saga {} scheduled {} {:?} past the end of time; {} never fires",
                    self.saga_id, event.payload_type, delay, token
                );
                token
            }
        }
    }

    fn schedule_at(&mut self, at: SystemTime, event: EventMessage) -> ScheduleToken {
        let due = at.max(self.world.clock.now());
        self.world.scheduler.schedule(due, event)
    }

    fn cancel_schedule(&mut self, token: ScheduleToken) {
        self.world.scheduler.cancel(token);
    }

    fn publish(&mut self, event: EventMessage) {
        let event = event.with_timestamp(self.world.clock.now());
        self.world.outbox.push_back(event);
    }

    fn send(&mut self, command: CommandMessage) -> SagaResult<Value> {
        self.world.commands.dispatch(command)
    }

    fn send_via(&mut self, gateway: &str, command: CommandMessage) -> SagaResult<Value> {
        self.world.commands.dispatch_via(gateway, command)
    }

    fn end(&mut self) {
        self.ended = true;
    }
}
