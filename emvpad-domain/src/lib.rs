//! EMV Pad Domain Layer
//!
//! Pure domain types with zero I/O dependencies.
//! Contains the terminal configuration, validated purchase amounts and the
//! typed records projected out of terminal responses.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod results;
pub mod value_objects;

// Re-export commonly used types
pub use config::{OperationMode, PinPadAddress, TerminalConfig, DEFAULT_POS_PACKAGE_ID};
pub use results::{
    AmountBreakdown, CardReadResult, CardReplaceResult, RecurringResult, SaleResult,
    TerminalError,
};
pub use value_objects::{DomainError, PurchaseAmount};
