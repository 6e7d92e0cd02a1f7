//! Error types for the Nebula engine
//!
//! One error enum is shared by the submission, memory and job subsystems.
//! Capacity exhaustion (full job queue, full ring) is not an error: those
//! paths report failure through `Option`/`bool` return values.

use std::fmt;

/// Result type for Nebula engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nebula engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Device call failed (submit, signal, reset) or an internal lock was poisoned
    BackendError(String),

    /// Device could not create an allocator, command buffer or transient memory
    OutOfMemory,

    /// Resource used outside its contract (foreign buffer, bad priority, bad alignment)
    InvalidResource(String),

    /// Initialization failed (fence, wait event, worker threads, engine singletons)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of device memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
