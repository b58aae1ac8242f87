//! Protocol layer error types.

use emvpad_domain::DomainError;
use thiserror::Error;

/// Errors raised while building requests or interpreting responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Terminal configuration is missing a required field
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// A required field is missing from an otherwise successful response
    #[error("Malformed response: missing required field {0}")]
    MalformedResponse(String),

    /// Request parameters cannot be rendered
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Domain validation error
    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl From<DomainError> for ProtocolError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ConfigurationInvalid(reason) => ProtocolError::ConfigurationInvalid(reason),
            other => ProtocolError::Domain(other),
        }
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
