//! Command dispatch abstraction.

use crate::error::SagaResult;
use crate::message::CommandMessage;
use crate::types::MetaData;
use serde_json::Value;

/// Abstraction for outbound command dispatch.
///
/// # Implementations
///
/// - **Production**: wraps the real command transport
/// - **Simulation**: records every command and answers from stubs, a
///   callback behavior or a configured default
///
/// # Command Flow
///
/// ```text
/// Saga                     CommandBus                 Handler
///   |                           |                         |
///   |-- dispatch(command) ----->|                         |
///   |                           |-- [transport/stub] ---->|
///   |<-- response --------------|                         |
/// ```
pub trait CommandBus {
    /// Dispatches a command and returns the handler's response.
    ///
    /// # Returns
    /// * `Ok(Value::Null)` - The handler produced no response
    /// * `Err(SagaError::CommandRejected)` - The command was refused
    fn dispatch(&mut self, command: CommandMessage) -> SagaResult<Value>;
}

/// Strategy computing the response to a dispatched command.
///
/// Closures of the shape `FnMut(&Value, &MetaData) -> SagaResult<Value>`
/// implement this directly.
pub trait CallbackBehavior {
    fn resolve(&mut self, command: &Value, metadata: &MetaData) -> SagaResult<Value>;
}

impl<F> CallbackBehavior for F
where
    F: FnMut(&Value, &MetaData) -> SagaResult<Value>,
{
    fn resolve(&mut self, command: &Value, metadata: &MetaData) -> SagaResult<Value> {
        self(command, metadata)
    }
}
