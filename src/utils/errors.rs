// src/utils/errors.rs
//! Engine error types
//!
//! The embedding boundary surfaces a single structured error kind:
//! precondition violations (bad image registration, failed dynamic load,
//! missing entry points) are unrecoverable for the operation that hit
//! them, and failures crossing into or out of the embedded runtime are
//! annotated with the failing operation while preserving the original
//! message. Nothing in this crate retries.

use thiserror::Error;

/// Convenience result type used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the interpreter embedding runtime
#[derive(Debug, Error)]
pub enum EngineError {
    /// Embedded-image registration preconditions were violated
    /// (null/empty/inverted byte range, double registration, or no
    /// image registered at all).
    #[error("Image registration error: {0}")]
    Registration(String),

    /// Standing up an interpreter instance failed: temporary file
    /// creation, the dynamic load itself, or a missing required
    /// entry-point symbol.
    #[error("Runtime load error: {0}")]
    LoadFailed(String),

    /// A failure crossed the boundary into or out of the embedded
    /// runtime (lookup, execution, serialization, materialization).
    #[error("Embedded runtime error: {0}")]
    Backend(String),

    /// A replicated object was requested from a session that was not
    /// acquired through an `InterpreterManager`.
    #[error("Replicated objects require a session acquired through an InterpreterManager")]
    NotManaged,
}

impl EngineError {
    /// Annotate an error with the operation that observed it, keeping
    /// the original message intact. Everything that crosses the
    /// embedding boundary funnels through this so callers see one
    /// consistent error kind regardless of where the failure started.
    pub(crate) fn in_op(self, op: &str) -> Self {
        match self {
            EngineError::Backend(msg) => EngineError::Backend(format!("{}: {}", op, msg)),
            other => EngineError::Backend(format!("{}: {}", op, other)),
        }
    }
}
