//! Error types for saga handling logic and its collaborators.

use thiserror::Error;

/// Errors raised by saga handling logic or by the contracts it calls into.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A payload could not be turned into its JSON representation
    #[error("Cannot encode payload of type {payload_type}: {reason}")]
    Encode {
        payload_type: &'static str,
        reason: String,
    },

    /// A payload did not decode into the type a handler expects
    #[error("Cannot decode payload of type {payload_type} as {target}: {reason}")]
    Decode {
        payload_type: String,
        target: &'static str,
        reason: String,
    },

    /// Saga logic called through a gateway nobody registered
    #[error("No command gateway registered under '{0}'")]
    GatewayNotRegistered(String),

    /// The dispatch transport refused a command
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// The saga's own handling logic failed
    #[error("Saga handler failed: {0}")]
    Handler(String),
}

impl SagaError {
    /// Creates a handler failure.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Creates a command rejection.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::CommandRejected(msg.into())
    }
}

/// Convenience alias for `Result<T, SagaError>`.
pub type SagaResult<T> = Result<T, SagaError>;
