//! EMV Pad Protocol Layer
//!
//! Pure request templating and response interpretation, deterministic, no I/O.
//!
//! # Architecture
//!
//! ```text
//! TerminalConfig + intent → RequestBuilder → RequestEnvelope → (transport)
//! (transport) → raw document → ResponseDocument → classify → typed result
//! ```
//!
//! # Components
//!
//! - **Builder**: Renders command documents and owns the sequence counter
//! - **Document**: Case-insensitive scalar field reader over raw responses
//! - **Extractor**: Busy/Error/Success classification and typed projections

#![warn(clippy::all)]

pub mod builder;
pub mod document;
pub mod envelope;
pub mod error;
pub mod extractor;

// Re-exports for convenience
pub use builder::{RequestBuilder, MAX_RECEIPT_LINES};
pub use document::{escape, read_field, ResponseDocument};
pub use envelope::{Operation, RequestEnvelope, RequestPayload};
pub use error::{ProtocolError, ProtocolResult};
pub use extractor::{
    classify, extract_card_read, extract_card_replace, extract_error, extract_recurring,
    extract_sale, is_busy, Classification, BUSY_RESPONSE_ORIGIN, BUSY_RETURN_CODE,
    MALFORMED_RESPONSE_CODE, MISSING_PARAMETERS_CODE, REQUEST_REJECTED_CODE, TIMEOUT_CODE,
    TRANSPORT_FAILURE_CODE,
};
