//! Error types for the simulation harness.

use crate::expect::ExpectationFailure;
use crate::fixture::Phase;
use saga_env::SagaError;
use std::time::SystemTime;
use thiserror::Error;

/// Errors surfaced by the harness.
#[derive(Debug, Error)]
pub enum SimError {
    /// A fixture operation was called out of GIVEN -> WHEN -> THEN order
    #[error("{operation} is not allowed in the {phase} phase")]
    PhaseViolation {
        operation: &'static str,
        phase: Phase,
    },

    /// The clock was asked to move backwards
    #[error("Cannot move virtual time back from {current:?} to {requested:?}")]
    TimeTravel {
        requested: SystemTime,
        current: SystemTime,
    },

    /// Advancing the clock overflowed the time representation
    #[error("Virtual clock overflow")]
    ClockOverflow,

    /// Raised by the saga under test, passed through unchanged
    #[error(transparent)]
    Saga(#[from] SagaError),

    /// A `expect_*` call found a mismatch
    #[error(transparent)]
    Expectation(#[from] ExpectationFailure),
}

impl SimError {
    /// Creates a phase violation.
    pub fn phase(operation: &'static str, phase: Phase) -> Self {
        Self::PhaseViolation { operation, phase }
    }

    /// Returns true if this is an expectation mismatch.
    pub fn is_expectation(&self) -> bool {
        matches!(self, Self::Expectation(_))
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
