//! Saga Deterministic Simulation Testing (DST) Harness
//!
//! This crate provides a controlled environment in which a saga's
//! event-reactive logic runs deterministically.
//!
//! # Core Principle: Everything Is Data
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock that moves only when the test says so
//! - **Deferred work**: triggers are entries in an ordered queue, fired
//!   synchronously as the clock passes them
//! - **Outbound commands**: recorded and answered by stubs, a callback
//!   behavior or a configured default
//! - **Identity**: saga ids derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SagaTestFixture                          │
//! │              GIVEN ──► WHEN ──► THEN                        │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                      SimWorld                         │  │
//! │  │  VirtualClock   TriggerScheduler   EventRecorder      │  │
//! │  │        │               │                ▲             │  │
//! │  │        ▼               ▼                │             │  │
//! │  │  ┌──────────────────────────────────────┴──────────┐  │  │
//! │  │  │ SagaInstanceRegistry + AssociationStore         │  │  │
//! │  │  └─────────────────────┬───────────────────────────┘  │  │
//! │  │                        ▼                              │  │
//! │  │              CommandGatewayInterceptor                │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │                 ExpectationEvaluator (read-only)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use saga_sim::{SagaTestFixture, stub::*};
//!
//! let mut fixture = SagaTestFixture::<StubSaga>::new();
//! fixture.register_command_gateway(STUB_GATEWAY)?;
//! fixture
//!     .given_aggregate("a")
//!     .published([EventMessage::new(TriggerSagaStartEvent::new("a"))?])?
//!     .when_time_elapses(Duration::from_secs(35 * 60))?
//!     .expect_dispatched_commands_equal_to([GREETING])?;
//! ```

mod association;
mod clock;
mod context;
mod error;
mod expect;
mod fixture;
mod gateway;
mod ids;
mod recorder;
mod registry;
mod runner;
mod scheduler;
mod world;
pub mod matchers;
pub mod scenarios;
pub mod stub;

pub use association::AssociationStore;
pub use clock::{default_epoch, VirtualClock};
pub use error::{SimError, SimResult};
pub use expect::{ExpectationEvaluator, ExpectationFailure};
pub use fixture::{GivenAggregate, Phase, SagaTestFixture, WhenAggregate};
pub use gateway::CommandGatewayInterceptor;
pub use ids::AggregateIdProvider;
pub use matchers::Matcher;
pub use recorder::EventRecorder;
pub use registry::{RouteOutcome, SagaInstance, SagaInstanceRegistry};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scheduler::{ScheduledTrigger, TriggerScheduler};
pub use world::{SimConfig, SimWorld};
