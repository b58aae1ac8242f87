//! Rendered outbound command documents.

use emvpad_domain::PurchaseAmount;
use serde::Serialize;
use std::fmt;

// =============================================================================
// Operation
// =============================================================================

/// Operation discriminator carried by every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    /// Administrative pad reset
    PadReset,
    /// EMV parameter refresh
    ParameterDownload,
    /// Card data collection without a monetary transaction
    CollectCardData,
    /// One-off sale
    Sale,
    /// Sale that stores the card for recurring billing
    RecurringSale,
    /// Zero-auth replacement of the card on a recurring profile
    CardReplace,
    /// Receipt print on the terminal printer
    PrintReceipt,
}

impl Operation {
    /// Value rendered into the `TranCode` field.
    pub fn tran_code(&self) -> &'static str {
        match self {
            Operation::PadReset => "EMVPadReset",
            Operation::ParameterDownload => "EMVParamDownload",
            Operation::CollectCardData => "GetPrePaidStripe",
            Operation::Sale | Operation::RecurringSale => "EMVSale",
            Operation::CardReplace => "EMVZeroAuth",
            Operation::PrintReceipt => "PrintReceipt",
        }
    }

    /// Root element wrapping the command fields.
    pub fn root_element(&self) -> &'static str {
        match self {
            Operation::ParameterDownload => "Admin",
            _ => "Transaction",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::PadReset => "pad_reset",
            Operation::ParameterDownload => "parameter_download",
            Operation::CollectCardData => "collect_card_data",
            Operation::Sale => "sale",
            Operation::RecurringSale => "recurring_sale",
            Operation::CardReplace => "card_replace",
            Operation::PrintReceipt => "print_receipt",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Operation-specific parameters stamped into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RequestPayload {
    /// No per-call parameters (reset, parameter download)
    None,
    /// Masked account number length constraints
    CardData { min_len: u8, max_len: u8 },
    /// Monetary request
    Purchase {
        amount: PurchaseAmount,
        invoice_no: String,
        recurring: bool,
    },
    /// Receipt lines
    Receipt { lines: usize },
}

/// A rendered command document ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestEnvelope {
    /// What this command does
    pub operation: Operation,
    /// Rendered sequence number (`001001` + counter)
    pub sequence_no: String,
    /// Per-call trace id
    pub trace_id: String,
    /// Per-call parameters
    pub payload: RequestPayload,
    /// The document handed to the transport
    pub document: String,
}

impl RequestEnvelope {
    /// Invoice number, for monetary envelopes.
    pub fn invoice_no(&self) -> Option<&str> {
        match &self.payload {
            RequestPayload::Purchase { invoice_no, .. } => Some(invoice_no),
            _ => None,
        }
    }
}
