//! Value Objects for the EMV Pad Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Amount is not a non-negative decimal
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A required terminal configuration field is missing or malformed
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),
}

// =============================================================================
// PurchaseAmount
// =============================================================================

/// Fixed-point purchase amount sent to the terminal.
///
/// # Invariants
/// - Must be >= 0
/// - Keeps the scale it was parsed with, so `"1.50"` renders back as `"1.50"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PurchaseAmount(Decimal);

impl PurchaseAmount {
    /// Create a new PurchaseAmount with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value < 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidAmount(format!(
                "Amount must not be negative, got {}",
                value
            )));
        }

        let mut value = value;
        // "-0.00" parses as a negative zero
        if value.is_zero() {
            value.set_sign_positive(true);
        }

        Ok(Self(value))
    }

    /// Parse a caller-supplied decimal string such as `"12.34"`.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` for empty, non-numeric or negative input
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidAmount("Amount is empty".to_string()));
        }

        let value = Decimal::from_str(trimmed)
            .map_err(|e| DomainError::InvalidAmount(format!("{}: {}", trimmed, e)))?;

        Self::new(value)
    }

    /// Zero amount with two decimal places, as used by zero-auth requests.
    pub fn zero() -> Self {
        Self(Decimal::new(0, 2))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for PurchaseAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PurchaseAmount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Tests
// =============================================================================
