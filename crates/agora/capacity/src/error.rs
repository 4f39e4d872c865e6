//! Error types for capacity invocation

use agora_types::CapacityId;

/// Errors raised while invoking a capacity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("No implementation of capacity {0}")]
    MissingImplementation(CapacityId),

    #[error("Implementation of {provided} cannot serve capacity {expected}")]
    ImplementationMismatch {
        expected: CapacityId,
        provided: CapacityId,
    },

    #[error("Invalid input for {capacity}: {reason}")]
    InvalidInput { capacity: CapacityId, reason: String },

    #[error("Invalid output from {capacity}: {reason}")]
    InvalidOutput { capacity: CapacityId, reason: String },

    #[error("Capacity call failed: {0}")]
    CallFailed(String),

    #[error("Capacity implementation panicked: {0}")]
    Panicked(String),

    #[error("Capacity call cancelled: {0}")]
    Cancelled(String),

    #[error("Capacity call interrupted by executor shutdown")]
    Interrupted,

    #[error("Capacity executor is shut down")]
    ExecutorShutdown,

    #[error("Worker pool error: {0}")]
    Pool(String),
}

/// Result type alias for capacity operations
pub type CapacityResult<T> = Result<T, CapacityError>;
