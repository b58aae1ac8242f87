//! Execution layer port definitions.
//!
//! The terminal firmware is reached through a vendor transport that exposes a
//! submit primitive, a cancel primitive and listener registration. Adapters
//! implement [`TerminalTransport`] for a concrete device (stub, vendor SDK).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ExecError;

/// Callback invoked with every raw response document.
///
/// Runs on the transport's own execution context; implementations must not
/// block.
pub type ResponseListener = Arc<dyn Fn(String) + Send + Sync>;

// =============================================================================
// Terminal Transport
// =============================================================================

/// Port for the opaque terminal transport.
///
/// Implementations:
/// - `StubTerminal` - In-memory terminal for tests and local runs
#[async_trait]
pub trait TerminalTransport: Send + Sync {
    /// Identifier of the physical terminal connection.
    ///
    /// Two executors over the same id are a configuration error.
    fn connection_id(&self) -> &str;

    /// Submit a command document.
    ///
    /// Returns as soon as the transport accepted the document; the response
    /// arrives later through the registered listeners.
    async fn process_transaction(&self, document: &str) -> Result<(), ExecError>;

    /// Ask the terminal to abort whatever it is doing.
    ///
    /// Must be harmless when nothing is outstanding.
    async fn cancel_request(&self) -> Result<(), ExecError>;

    /// Register a response listener.
    fn add_response_listener(&self, listener: ResponseListener);

    /// Drop every registered listener.
    fn clear_response_listeners(&self);
}
