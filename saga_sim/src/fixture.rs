//! GIVEN / WHEN / THEN fixture for saga tests.
//!
//! A [`SagaTestFixture`] owns one [`SimWorld`] and walks it through three
//! phases:
//!
//! - **GIVEN**: prime the world. Events are routed and time may pass, but
//!   nothing is kept for assertions.
//! - **WHEN**: recordings are cleared and exactly one stimulus is applied.
//! - **THEN**: `expect_*` calls inspect what the stimulus caused.
//!
//! Calls out of that order fail at the call site with
//! [`SimError::PhaseViolation`].
//!
//! # Example
//!
//! ```ignore
//! let mut fixture = SagaTestFixture::<StubSaga>::new();
//! fixture.register_command_gateway(STUB_GATEWAY)?;
//! fixture
//!     .given_aggregate("a")
//!     .published([EventMessage::new(TriggerSagaStartEvent::new("a"))?])?
//!     .when_time_elapses(Duration::from_secs(35 * 60))?
//!     .expect_active_sagas(1)?
//!     .expect_dispatched_commands_equal_to(["Say hi!"])?;
//! ```

use crate::error::{SimError, SimResult};
use crate::expect::{ExpectationEvaluator, ExpectationFailure};
use crate::matchers::Matcher;
use crate::world::{SimConfig, SimWorld};

use saga_env::{type_tag, CallbackBehavior, CommandMessage, EventMessage, Saga, SagaError};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Scenario phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Given,
    When,
    Then,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Given => write!(f, "GIVEN"),
            Phase::When => write!(f, "WHEN"),
            Phase::Then => write!(f, "THEN"),
        }
    }
}

/// Single-use test fixture for saga type `S`.
pub struct SagaTestFixture<S> {
    world: SimWorld<S>,
    phase: Phase,

    /// Next sequence number per aggregate id
    sequences: HashMap<String, u64>,
}

impl<S: Saga> SagaTestFixture<S> {
    /// Creates a fixture with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self {
            world: SimWorld::new(config),
            phase: Phase::Given,
            sequences: HashMap::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the current virtual time.
    pub fn current_time(&self) -> SystemTime {
        self.world.now()
    }

    pub fn world(&self) -> &SimWorld<S> {
        &self.world
    }

    // ------------------------------------------------------------------
    // Configuration (GIVEN only)
    // ------------------------------------------------------------------

    /// Registers a named command gateway backed by the recording interceptor.
    pub fn register_command_gateway(&mut self, name: impl Into<String>) -> SimResult<&mut Self> {
        self.require_given("register_command_gateway")?;
        self.world.commands_mut().register_gateway(name);
        Ok(self)
    }

    /// Answers `response` whenever `command` is dispatched.
    pub fn stub_command<C, R>(&mut self, command: C, response: R) -> SimResult<&mut Self>
    where
        C: Serialize + 'static,
        R: Serialize + 'static,
    {
        self.require_given("stub_command")?;
        let command = encode(&command)?;
        let response = encode(&response)?;
        self.world.commands_mut().stub(command, response);
        Ok(self)
    }

    /// Installs the strategy answering commands no stub covers.
    pub fn set_callback_behavior(
        &mut self,
        behavior: impl CallbackBehavior + 'static,
    ) -> SimResult<&mut Self> {
        self.require_given("set_callback_behavior")?;
        self.world.commands_mut().set_callback_behavior(Box::new(behavior));
        Ok(self)
    }

    /// Sets the response for commands neither a stub nor the callback answers.
    pub fn set_default_command_response(&mut self, response: Value) -> SimResult<&mut Self> {
        self.require_given("set_default_command_response")?;
        self.world.commands_mut().set_default_response(response);
        Ok(self)
    }

    // ------------------------------------------------------------------
    // GIVEN
    // ------------------------------------------------------------------

    /// Starts a batch of events published by aggregate `id`.
    pub fn given_aggregate(&mut self, id: impl ToString) -> GivenAggregate<'_, S> {
        GivenAggregate {
            fixture: self,
            aggregate_id: id.to_string(),
            operation: "given_aggregate",
        }
    }

    pub fn and_then_aggregate(&mut self, id: impl ToString) -> GivenAggregate<'_, S> {
        GivenAggregate {
            fixture: self,
            aggregate_id: id.to_string(),
            operation: "and_then_aggregate",
        }
    }

    /// Publishes an event that no aggregate sourced.
    pub fn given_a_published(&mut self, event: EventMessage) -> SimResult<&mut Self> {
        self.require_given("given_a_published")?;
        self.world.inject(event)?;
        Ok(self)
    }

    pub fn and_then_a_published(&mut self, event: EventMessage) -> SimResult<&mut Self> {
        self.require_given("and_then_a_published")?;
        self.world.inject(event)?;
        Ok(self)
    }

    /// Lets virtual time pass, firing whatever comes due.
    pub fn given_time_elapses(&mut self, duration: Duration) -> SimResult<&mut Self> {
        self.require_given("given_time_elapses")?;
        self.world.advance_by(duration)?;
        Ok(self)
    }

    pub fn and_then_time_elapses(&mut self, duration: Duration) -> SimResult<&mut Self> {
        self.require_given("and_then_time_elapses")?;
        self.world.advance_by(duration)?;
        Ok(self)
    }

    pub fn and_then_time_advances_to(&mut self, time: SystemTime) -> SimResult<&mut Self> {
        self.require_given("and_then_time_advances_to")?;
        self.world.advance_to(time)?;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // WHEN
    // ------------------------------------------------------------------

    /// Prepares the stimulus: one event published by aggregate `id`.
    pub fn when_aggregate(&mut self, id: impl ToString) -> WhenAggregate<'_, S> {
        WhenAggregate {
            fixture: self,
            aggregate_id: id.to_string(),
        }
    }

    /// Stimulus: one event that no aggregate sourced.
    pub fn when_publishing_a(&mut self, event: EventMessage) -> SimResult<&mut Self> {
        self.enter_when("when_publishing_a")?;
        self.world.inject(event)?;
        Ok(self)
    }

    /// Stimulus: virtual time passes by `duration`.
    ///
    /// An unreachable target is rejected while the fixture is still in GIVEN.
    pub fn when_time_elapses(&mut self, duration: Duration) -> SimResult<&mut Self> {
        self.require_given("when_time_elapses")?;
        let target = self.world.clock().after(duration)?;
        self.enter_when("when_time_elapses")?;
        self.world.fire_due_as_of(target)?;
        Ok(self)
    }

    /// Stimulus: virtual time moves to `time`.
    ///
    /// A time in the past is rejected while the fixture is still in GIVEN.
    pub fn when_time_advances_to(&mut self, time: SystemTime) -> SimResult<&mut Self> {
        self.require_given("when_time_advances_to")?;
        let current = self.current_time();
        if time < current {
            return Err(SimError::TimeTravel {
                requested: time,
                current,
            });
        }
        self.enter_when("when_time_advances_to")?;
        self.world.advance_to(time)?;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // THEN
    // ------------------------------------------------------------------

    /// Enters THEN and returns the evaluator, for running several checks
    /// and collecting every mismatch instead of stopping at the first.
    pub fn then(&mut self) -> SimResult<ExpectationEvaluator<'_>> {
        self.enter_then("then")?;
        Ok(self.world.evaluator())
    }

    pub fn expect_active_sagas(&mut self, expected: usize) -> SimResult<&mut Self> {
        self.check("expect_active_sagas", |e| e.active_sagas(expected))
    }

    pub fn expect_association_with(
        &mut self,
        key: &str,
        value: impl ToString,
    ) -> SimResult<&mut Self> {
        let value = value.to_string();
        self.check("expect_association_with", |e| e.association_with(key, &value))
    }

    pub fn expect_no_association_with(
        &mut self,
        key: &str,
        value: impl ToString,
    ) -> SimResult<&mut Self> {
        let value = value.to_string();
        self.check("expect_no_association_with", |e| e.no_association_with(key, &value))
    }

    /// Expects a trigger due `delay` from now carrying `payload`.
    pub fn expect_scheduled_event<E>(&mut self, delay: Duration, payload: E) -> SimResult<&mut Self>
    where
        E: Serialize + 'static,
    {
        let event = EventMessage::new(payload)?;
        self.check("expect_scheduled_event", |e| e.scheduled_event(delay, &event))
    }

    /// Expects a trigger due at `time` carrying `payload`.
    pub fn expect_scheduled_event_at<E>(
        &mut self,
        time: SystemTime,
        payload: E,
    ) -> SimResult<&mut Self>
    where
        E: Serialize + 'static,
    {
        let event = EventMessage::new(payload)?;
        self.check("expect_scheduled_event_at", |e| e.scheduled_event_at(time, &event))
    }

    pub fn expect_scheduled_event_of_type<T: ?Sized + 'static>(
        &mut self,
        delay: Duration,
    ) -> SimResult<&mut Self> {
        self.check("expect_scheduled_event_of_type", |e| e.scheduled_event_of_type::<T>(delay))
    }

    pub fn expect_scheduled_event_of_type_at<T: ?Sized + 'static>(
        &mut self,
        time: SystemTime,
    ) -> SimResult<&mut Self> {
        self.check("expect_scheduled_event_of_type_at", |e| e.scheduled_event_of_type_at::<T>(time))
    }

    pub fn expect_scheduled_event_matching(
        &mut self,
        delay: Duration,
        matcher: Matcher<EventMessage>,
    ) -> SimResult<&mut Self> {
        self.check("expect_scheduled_event_matching", |e| {
            e.scheduled_event_matching(delay, &matcher)
        })
    }

    pub fn expect_scheduled_event_matching_at(
        &mut self,
        time: SystemTime,
        matcher: Matcher<EventMessage>,
    ) -> SimResult<&mut Self> {
        self.check("expect_scheduled_event_matching_at", |e| {
            e.scheduled_event_matching_at(time, &matcher)
        })
    }

    pub fn expect_no_scheduled_events(&mut self) -> SimResult<&mut Self> {
        self.check("expect_no_scheduled_events", |e| e.no_scheduled_events())
    }

    /// Expects exactly these command payloads, in dispatch order.
    pub fn expect_dispatched_commands_equal_to<C, I>(&mut self, commands: I) -> SimResult<&mut Self>
    where
        I: IntoIterator<Item = C>,
        C: Serialize + 'static,
    {
        let expected = commands
            .into_iter()
            .map(|c| encode(&c))
            .collect::<SimResult<Vec<Value>>>()?;
        self.check("expect_dispatched_commands_equal_to", |e| {
            e.dispatched_commands_equal_to(&expected)
        })
    }

    pub fn expect_dispatched_commands_matching(
        &mut self,
        matcher: Matcher<[CommandMessage]>,
    ) -> SimResult<&mut Self> {
        self.check("expect_dispatched_commands_matching", |e| {
            e.dispatched_commands_matching(&matcher)
        })
    }

    pub fn expect_no_dispatched_commands(&mut self) -> SimResult<&mut Self> {
        self.check("expect_no_dispatched_commands", |e| e.no_dispatched_commands())
    }

    /// Expects exactly these events, compared by type and payload, in
    /// publication order.
    pub fn expect_published_events(&mut self, events: &[EventMessage]) -> SimResult<&mut Self> {
        self.check("expect_published_events", |e| e.published_events(events))
    }

    pub fn expect_published_events_matching(
        &mut self,
        matcher: Matcher<[EventMessage]>,
    ) -> SimResult<&mut Self> {
        self.check("expect_published_events_matching", |e| e.published_events_matching(&matcher))
    }

    // ------------------------------------------------------------------
    // Phase bookkeeping
    // ------------------------------------------------------------------

    fn require_given(&self, operation: &'static str) -> SimResult<()> {
        match self.phase {
            Phase::Given => Ok(()),
            phase => Err(SimError::phase(operation, phase)),
        }
    }

    fn enter_when(&mut self, operation: &'static str) -> SimResult<()> {
        self.require_given(operation)?;
        debug!("Entering WHEN with {}", operation);
        self.phase = Phase::When;
        self.world.start_recording();
        Ok(())
    }

    fn enter_then(&mut self, operation: &'static str) -> SimResult<()> {
        match self.phase {
            Phase::Given => Err(SimError::phase(operation, Phase::Given)),
            _ => {
                self.phase = Phase::Then;
                Ok(())
            }
        }
    }

    fn check<F>(&mut self, operation: &'static str, f: F) -> SimResult<&mut Self>
    where
        F: FnOnce(&ExpectationEvaluator<'_>) -> Result<(), ExpectationFailure>,
    {
        self.enter_then(operation)?;
        f(&self.world.evaluator())?;
        Ok(self)
    }

    /// Tags an aggregate event with its origin and routes it.
    fn publish_from_aggregate(&mut self, aggregate_id: &str, event: EventMessage) -> SimResult<()> {
        let sequence = self.sequences.entry(aggregate_id.to_string()).or_insert(0);
        let event = event.with_origin(aggregate_id, *sequence);
        *sequence += 1;
        self.world.inject(event)
    }
}

impl<S: Saga> fmt::Debug for SagaTestFixture<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaTestFixture")
            .field("phase", &self.phase)
            .field("now", &self.world.now())
            .field("active_sagas", &self.world.registry().active_count())
            .field("pending_triggers", &self.world.scheduler().len())
            .field("commands", self.world.commands())
            .field("aggregates", &self.sequences.len())
            .finish()
    }
}

impl<S: Saga> Default for SagaTestFixture<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Events published by one aggregate during GIVEN.
pub struct GivenAggregate<'f, S> {
    fixture: &'f mut SagaTestFixture<S>,
    aggregate_id: String,
    operation: &'static str,
}

impl<'f, S: Saga> GivenAggregate<'f, S> {
    /// Routes `events` in order, each tagged with the next sequence number.
    pub fn published(
        self,
        events: impl IntoIterator<Item = EventMessage>,
    ) -> SimResult<&'f mut SagaTestFixture<S>> {
        self.fixture.require_given(self.operation)?;
        for event in events {
            self.fixture.publish_from_aggregate(&self.aggregate_id, event)?;
        }
        Ok(self.fixture)
    }
}

/// The WHEN stimulus published by one aggregate.
pub struct WhenAggregate<'f, S> {
    fixture: &'f mut SagaTestFixture<S>,
    aggregate_id: String,
}

impl<'f, S: Saga> WhenAggregate<'f, S> {
    pub fn publishes(self, event: EventMessage) -> SimResult<&'f mut SagaTestFixture<S>> {
        self.fixture.enter_when("when_aggregate")?;
        self.fixture.publish_from_aggregate(&self.aggregate_id, event)?;
        Ok(self.fixture)
    }
}

fn encode<T: Serialize + 'static>(value: &T) -> SimResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        SimError::from(SagaError::Encode {
            payload_type: type_tag::<T>(),
            reason: e.to_string(),
        })
    })
}
