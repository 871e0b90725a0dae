//! Error types for the task pool manager.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the task pool public API.
///
/// Every expected failure is one of these kinds. An operation either succeeds
/// with a defined state change or returns an error and leaves state unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    /// A task with the same identity is already registered.
    #[error("task '{id}' is already registered")]
    AlreadyRegistered { id: String },

    /// No task is registered under the given identity.
    #[error("task '{id}' is not registered")]
    NotFound { id: String },

    /// The registry already holds the maximum number of distinct tasks.
    #[error("registry is full ({capacity} tasks)")]
    CapacityExceeded { capacity: usize },

    /// The requested worker multiplicity is outside the allowed range.
    #[error("multiplicity {requested} is out of range (max {max})")]
    InvalidMultiplicity { requested: usize, max: usize },

    /// The task cannot accept the operation in its current state.
    #[error("task '{id}' is busy: {reason}")]
    Busy { id: String, reason: String },

    /// A synchronous stop exceeded its wait bound before all workers drained.
    #[error("task '{id}' did not drain within {waited:?}")]
    ShutdownTimeout { id: String, waited: Duration },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
