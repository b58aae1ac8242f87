//! EMV Pad Execution Layer
//!
//! Owns the one live handle to the opaque terminal transport.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator → Executor → RequestBuilder → TerminalTransport (submit / cancel)
//!                                                   ↓
//! Orchestrator ← ResponseListener ←──────── raw response document
//! ```
//!
//! # Components
//!
//! - **Ports**: The transport trait and listener type
//! - **Executor**: One async operation per command type, listener management,
//!   and the process-wide connection lease
//! - **Stub**: In-memory terminal for tests and local runs
//!
//! # Example
//!
//! ```rust,ignore
//! use emvpad_exec::{Executor, StubTerminal};
//! use std::sync::Arc;
//!
//! let terminal = Arc::new(StubTerminal::new());
//! let executor = Executor::new(terminal, config)?;
//!
//! executor.register_listener(Arc::new(|raw| println!("{raw}")));
//! executor.reset_pad().await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use executor::Executor;
pub use ports::{ResponseListener, TerminalTransport};
pub use stub::{Responder, StubResponse, StubTerminal};
