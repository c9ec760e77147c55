//! SimWorld - The simulation harness container.

use crate::clock::{default_epoch, VirtualClock};
use crate::context::Collaborators;
use crate::error::SimResult;
use crate::expect::ExpectationEvaluator;
use crate::gateway::CommandGatewayInterceptor;
use crate::recorder::EventRecorder;
use crate::registry::SagaInstanceRegistry;
use crate::scheduler::{ScheduledTrigger, TriggerScheduler};

use saga_env::{EventMessage, Saga};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Seed mixed into saga instance ids
    pub seed: u64,

    /// Virtual time at which the simulation starts
    pub epoch: SystemTime,

    /// Response to commands no stub or callback answers
    pub default_command_response: Value,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            epoch: default_epoch(),
            default_command_response: Value::Null,
        }
    }
}

/// The SimWorld - container for one scenario's simulation state.
///
/// Owns the clock, the scheduler, the instance registry and both recorders.
/// Nothing here is shared between worlds, so independent scenarios can run
/// side by side.
pub struct SimWorld<S> {
    /// Configuration
    pub config: SimConfig,

    /// Virtual clock
    clock: VirtualClock,

    /// Pending triggers
    scheduler: TriggerScheduler,

    /// Saga instances and their associations
    registry: SagaInstanceRegistry<S>,

    /// Recording command transport
    commands: CommandGatewayInterceptor,

    /// Published-event capture
    events: EventRecorder,

    /// Events published by handlers, waiting for delivery
    outbox: VecDeque<EventMessage>,
}

impl<S: Saga> SimWorld<S> {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Self {
        let clock = VirtualClock::new(config.epoch);
        let registry = SagaInstanceRegistry::new(config.seed);
        let commands = CommandGatewayInterceptor::new(config.default_command_response.clone());

        Self {
            config,
            clock,
            scheduler: TriggerScheduler::new(),
            registry,
            commands,
            events: EventRecorder::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Delivers an injected event at the current virtual time.
    ///
    /// The event itself is the caller's input and is not recorded; events
    /// that handlers publish in response are.
    pub fn inject(&mut self, event: EventMessage) -> SimResult<()> {
        let event = event.with_timestamp(self.clock.now());
        self.deliver(event)
    }

    /// Advances the clock by `duration`, firing every trigger that comes due.
    pub fn advance_by(&mut self, duration: Duration) -> SimResult<Vec<ScheduledTrigger>> {
        let target = self.clock.after(duration)?;
        self.fire_due_as_of(target)
    }

    /// Advances the clock to `time`, firing every trigger that comes due.
    pub fn advance_to(&mut self, time: SystemTime) -> SimResult<Vec<ScheduledTrigger>> {
        if time < self.clock.now() {
            // Let the clock produce the TimeTravel error.
            self.clock.advance_to(time)?;
        }
        self.fire_due_as_of(time)
    }

    /// Fires triggers due at or before `time` in due order, then leaves the
    /// clock at `time`.
    ///
    /// The scheduler is re-scanned after every fire, so a trigger scheduled
    /// by a fired trigger's handler also fires here if it is due in range.
    /// While a trigger fires, the clock reads its due time.
    pub fn fire_due_as_of(&mut self, time: SystemTime) -> SimResult<Vec<ScheduledTrigger>> {
        let mut fired = Vec::new();

        while let Some(trigger) = self.scheduler.pop_due(time) {
            self.clock.advance_to(trigger.due_time.max(self.clock.now()))?;
            debug!(
                "Firing {} ({}) at {:?}",
                trigger.token, trigger.payload.payload_type, trigger.due_time
            );

            let event = trigger.payload.clone().with_timestamp(trigger.due_time);
            self.publish(event)?;
            fired.push(trigger);
        }

        self.clock.advance_to(time)?;
        Ok(fired)
    }

    /// Publishes an event on the bus: recorded, then delivered.
    fn publish(&mut self, event: EventMessage) -> SimResult<()> {
        self.events.record(&event);
        self.deliver(event)
    }

    /// Routes `event`, then drains whatever handlers published, in order.
    fn deliver(&mut self, event: EventMessage) -> SimResult<()> {
        let result = self.route(&event).and_then(|_| {
            while let Some(next) = self.outbox.pop_front() {
                self.events.record(&next);
                self.route(&next)?;
            }
            Ok(())
        });

        if result.is_err() {
            self.outbox.clear();
        }
        result
    }

    fn route(&mut self, event: &EventMessage) -> SimResult<()> {
        let mut world = Collaborators {
            clock: &self.clock,
            scheduler: &mut self.scheduler,
            commands: &mut self.commands,
            outbox: &mut self.outbox,
        };
        self.registry.route(event, &mut world)?;
        Ok(())
    }

    /// Clears recorded commands and events and starts recording.
    pub fn start_recording(&mut self) {
        self.commands.clear();
        self.events.start_recording();
    }

    /// Returns a read-only evaluator over the current state.
    pub fn evaluator(&self) -> ExpectationEvaluator<'_> {
        ExpectationEvaluator::new(
            &self.clock,
            &self.scheduler,
            self.registry.active_count(),
            self.registry.associations(),
            self.commands.recorded(),
            self.events.events(),
        )
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &SagaInstanceRegistry<S> {
        &self.registry
    }

    pub fn commands(&self) -> &CommandGatewayInterceptor {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandGatewayInterceptor {
        &mut self.commands
    }

    pub fn events(&self) -> &EventRecorder {
        &self.events
    }
}
