//! Execution layer error types.

use emvpad_protocol::{Operation, ProtocolError};
use thiserror::Error;

/// Errors that can occur while talking to the terminal transport.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Transport rejected the submission or the cancel
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request could not be built
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Envelope handed to the wrong operation
    #[error("Envelope mismatch: expected {expected}, got {actual}")]
    EnvelopeMismatch {
        /// Operation the call submits
        expected: Operation,
        /// Operation the envelope was built for
        actual: Operation,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
