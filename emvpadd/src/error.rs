//! Orchestrator error types.
//!
//! Only integration errors come back from a call: bad configuration, bad
//! input, or a call made while another operation is outstanding. Terminal and
//! transport errors are reported through the notification channels instead.

use emvpad_domain::DomainError;
use emvpad_exec::ExecError;
use emvpad_protocol::ProtocolError;
use thiserror::Error;

/// Orchestrator-level errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Terminal configuration is missing a required field
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// Domain validation error (e.g. a negative amount)
    #[error("Domain error: {0}")]
    Domain(DomainError),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(ExecError),

    /// A caller-initiated operation is already outstanding
    #[error("Operation in progress: orchestrator is {state}")]
    OperationInProgress { state: String },

    /// Environment configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The orchestrator task has stopped
    #[error("Orchestrator shut down")]
    Shutdown,
}

impl From<DomainError> for OrchestratorError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ConfigurationInvalid(reason) => OrchestratorError::ConfigurationInvalid(reason),
            other => OrchestratorError::Domain(other),
        }
    }
}

impl From<ProtocolError> for OrchestratorError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ConfigurationInvalid(reason) => OrchestratorError::ConfigurationInvalid(reason),
            ProtocolError::Domain(inner) => inner.into(),
            other => OrchestratorError::Protocol(other),
        }
    }
}

impl From<ExecError> for OrchestratorError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Protocol(inner) => inner.into(),
            other => OrchestratorError::Exec(other),
        }
    }
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
