//! Typed results projected out of successful terminal responses.
//!
//! Field names serialize in camelCase so a host bridge can forward them
//! unchanged as notification payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Terminal Error
// =============================================================================

/// Error reported by the terminal (or synthesized for transport failures).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalError {
    /// Return code, e.g. `000002`
    pub code: String,
    /// Human-readable text
    pub message: String,
}

impl TerminalError {
    /// Create a new terminal error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Amount group echoed back by the terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountBreakdown {
    /// Purchase amount
    pub purchase: String,
    /// Tip
    pub gratuity: String,
    /// Authorized amount (may be partial)
    pub authorize: String,
    /// Cash back
    pub cash_back: String,
}

/// Result of an approved sale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResult {
    /// `Client` or `Processor`
    pub response_origin: String,
    /// Return code
    pub dsix_return_code: String,
    /// `Approved`, `Declined`, ...
    pub cmd_status: String,
    /// Human-readable response text
    pub text_response: String,
    /// Sequence number echoed from the request
    pub sequence_no: String,
    /// Trace id echoed from the request
    pub user_trace: String,
    /// Merchant id
    pub merchant_id: String,
    /// Masked account number
    pub acct_no: String,
    /// Card brand
    pub card_type: String,
    /// Transaction code
    pub tran_code: String,
    /// Authorization code
    pub auth_code: String,
    /// Capture status
    pub capture_status: String,
    /// Reference number
    pub ref_no: String,
    /// Invoice number
    pub invoice_no: String,
    /// Amount group
    pub amount: AmountBreakdown,
    /// Acquirer reference data
    pub acq_ref_data: String,
    /// Processor data
    pub process_data: String,
    /// Record number (token)
    pub record_no: String,
    /// Entry method (chip, swipe, tap)
    pub entry_method: String,
    /// Transaction date
    pub date: String,
    /// Transaction time
    pub time: String,
    /// EMV application label
    pub application_label: String,
    /// EMV application id
    pub aid: String,
    /// Terminal verification results
    pub tvr: String,
    /// Issuer application data
    pub iad: String,
    /// Transaction status information
    pub tsi: String,
    /// Authorization response code
    pub arc: String,
    /// Cardholder verification method
    pub cvm: String,
    /// Pay API id
    pub pay_api_id: String,
}

/// Result of an approved recurring sale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringResult {
    /// Sale fields
    #[serde(flatten)]
    pub sale: SaleResult,
    /// Cardholder id
    pub cardholder_id: String,
    /// Cardholder name
    pub cardholder_name: String,
    /// Recurring-data marker
    pub recurring_data: String,
}

/// Result of a zero-auth card replacement on a recurring profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardReplaceResult {
    /// Sale fields
    #[serde(flatten)]
    pub sale: SaleResult,
    /// Cardholder id
    pub cardholder_id: String,
    /// Cardholder name
    pub cardholder_name: String,
}

// =============================================================================
// Card Read
// =============================================================================

/// Card data collected without a monetary transaction.
///
/// Every field except the cardholder name is required; a response missing one
/// is rejected as malformed rather than degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardReadResult {
    /// Cardholder name, when the card carries one
    pub cardholder_name: Option<String>,
    /// Expiry month
    pub exp_month: String,
    /// Expiry year
    pub exp_year: String,
    /// First six digits of the account number
    pub card_bin: String,
    /// Last four digits of the account number
    pub last4: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_result_serializes_camel_case() {
        let result = SaleResult {
            cmd_status: "Approved".to_string(),
            amount: AmountBreakdown {
                purchase: "12.34".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["cmdStatus"], "Approved");
        assert_eq!(json["amount"]["purchase"], "12.34");
        assert!(json.get("cmd_status").is_none());
    }

    #[test]
    fn test_recurring_result_flattens_sale() {
        let result = RecurringResult {
            sale: SaleResult {
                record_no: "RN-1".to_string(),
                ..Default::default()
            },
            recurring_data: "Recurring".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["recordNo"], "RN-1");
        assert_eq!(json["recurringData"], "Recurring");

        let parsed: RecurringResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_terminal_error_display() {
        let err = TerminalError::new("000002", "Parameters missing");
        assert_eq!(err.to_string(), "Parameters missing (000002)");
    }
}
