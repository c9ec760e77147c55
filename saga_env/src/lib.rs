//! Saga Environment Contracts
//!
//! This crate provides the seam between a saga under test and whatever runs
//! it: in production a real event bus and command transport, in simulation
//! the deterministic harness in `saga_sim`.
//!
//! # Core Concept: Static Handler Tables
//!
//! A saga type declares its handlers once, keyed by event type tag:
//! - **Correlation**: which association key(s) an event routes on
//! - **Creation**: whether an event may start a new instance
//! - **Behavior**: what the instance does, through a [`SagaContext`]
//!
//! # Example
//!
//! ```ignore
//! use saga_env::{HandlerTable, Saga, SagaContext, SagaContextExt};
//!
//! impl Saga for OrderSaga {
//!     fn handlers(table: &mut HandlerTable<Self>) {
//!         table.start_on("order", |e: &OrderPlaced| e.id.clone(), |saga, e, ctx| {
//!             saga.deadline = Some(ctx.schedule_payload_after(TEN_MINUTES, Expired::from(e))?);
//!             Ok(())
//!         });
//!     }
//! }
//! ```

mod context;
mod error;
mod gateway;
mod message;
mod saga;
mod types;

pub use context::{SagaContext, SagaContextExt};
pub use error::{SagaError, SagaResult};
pub use gateway::{CallbackBehavior, CommandBus};
pub use message::{type_tag, AggregateOrigin, CommandMessage, EventMessage, Message};
pub use saga::{Correlation, EventHandler, HandlerTable, Saga, SagaCreationPolicy};
pub use types::{AssociationValue, MetaData, SagaId, ScheduleToken};
