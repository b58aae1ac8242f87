//! EMV Pad Orchestrator Library
//!
//! Drives an EMV pin pad through an opaque submit/cancel transport and
//! reports outcomes on two notification channels.
//!
//! # Architecture
//!
//! ```text
//! Host → Orchestrator → Executor → RequestBuilder → TerminalTransport
//!             ↑                                           │
//!             └──────────── ResponseListener ←────────────┘
//!             │
//!             └──→ Notifications (transaction / config) → Host
//! ```
//!
//! # Components
//!
//! - **Orchestrator**: Single task owning the state machine and watchdog
//! - **State**: Outstanding operation and pad-reset chaining
//! - **Event Bus**: Transaction and configuration notification channels
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use emvpadd::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let (orchestrator, _terminal) = Orchestrator::new_stub(&config)?;
//!     let mut transactions = orchestrator.subscribe_transactions();
//!
//!     orchestrator.sell("12.34").await?;
//!     let outcome = transactions.recv().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod orchestrator;
pub mod state;

// Re-exports for convenience
pub use config::{Config, Environment, RuntimeConfig, MAX_EVENT_CAPACITY};
pub use error::{OrchestratorError, OrchestratorResult};
pub use event_bus::{ConfigEvent, EventBus, EventReceiver, Notification, Notifications, TransactionEvent};
pub use orchestrator::{
    Orchestrator, CONFIGURATION_CANCELLED_MESSAGE, PARAMETER_DOWNLOAD_MESSAGE, TRANSACTION_CANCELLED_MESSAGE,
};
pub use state::{Channel, OrchestratorState, PendingOperation};
