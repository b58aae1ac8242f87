//! Request builder: renders command documents from the terminal configuration.
//!
//! Every envelope carries the operation mode, merchant id, secure device id,
//! POS package id, a freshly incremented sequence number and a trace id.
//! Monetary envelopes also carry an invoice/reference number made of the
//! current time and the sequence counter, so two builds inside the same
//! millisecond still differ.
//!
//! # Document shape
//!
//! ```text
//! <?xml version="1.0"?>
//! <TStream>
//!   <Transaction>            (Admin for parameter download)
//!     <MerchantID>..         common fields
//!     <TranCode>..
//!     ...                    operation fields
//!   </Transaction>
//! </TStream>
//! ```

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use emvpad_domain::{PurchaseAmount, TerminalConfig, DEFAULT_POS_PACKAGE_ID};
use tracing::{debug, warn};

use crate::document::escape;
use crate::envelope::{Operation, RequestEnvelope, RequestPayload};
use crate::error::{ProtocolError, ProtocolResult};

/// First value handed out is `SEQUENCE_START + 1`.
const SEQUENCE_START: u64 = 10;
const SEQUENCE_PREFIX: &str = "001001";
/// Counter digits kept in the invoice number after the millisecond timestamp.
const INVOICE_COUNTER_MODULUS: u64 = 1_000_000;

const OPERATOR_FIELD: &str = "01";
const TERMINAL_ID: &str = "00000001";
const COM_PORT: &str = "1";

const CARD_DATA_MIN_LEN: u8 = 0;
const CARD_DATA_MAX_LEN: u8 = 19;

/// Most lines the terminal printer accepts in one receipt.
pub const MAX_RECEIPT_LINES: usize = 36;

// =============================================================================
// Request Builder
// =============================================================================

/// Renders command documents and owns the sequence counter.
///
/// The counter is atomic so the builder can be shared by reference, but the
/// orchestrator only ever builds from one task.
pub struct RequestBuilder {
    config: TerminalConfig,
    sequence: AtomicU64,
}

/// Fields resolved once per build.
struct Stamp<'a> {
    sequence_no: String,
    trace_id: String,
    invoice_no: String,
    pos_package_id: Cow<'a, str>,
}

impl RequestBuilder {
    /// Create a builder for `config`.
    pub fn new(config: TerminalConfig) -> Self {
        Self {
            config,
            sequence: AtomicU64::new(SEQUENCE_START),
        }
    }

    /// Configuration stamped onto every envelope.
    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    /// `EMVPadReset` with forms suppressed.
    pub fn pad_reset(&self) -> ProtocolResult<RequestEnvelope> {
        self.build(Operation::PadReset, RequestPayload::None, |doc, _| {
            doc.field("UseForms", "Suppressed");
        })
    }

    /// `EMVParamDownload`, wrapped in an `Admin` element.
    pub fn parameter_download(&self) -> ProtocolResult<RequestEnvelope> {
        self.build(Operation::ParameterDownload, RequestPayload::None, |doc, _| {
            doc.field("TerminalID", TERMINAL_ID);
        })
    }

    /// Card data collection from the secure device.
    pub fn collect_card_data(&self) -> ProtocolResult<RequestEnvelope> {
        let payload = RequestPayload::CardData {
            min_len: CARD_DATA_MIN_LEN,
            max_len: CARD_DATA_MAX_LEN,
        };

        self.build(Operation::CollectCardData, payload, |doc, _| {
            doc.field("ComPort", COM_PORT);
            doc.open("Account");
            doc.field("AcctNo", "SecureDevice");
            doc.close("Account");
            doc.field("MinLen", &CARD_DATA_MIN_LEN.to_string());
            doc.field("MaxLen", &CARD_DATA_MAX_LEN.to_string());
        })
    }

    /// One-off sale for `amount`.
    pub fn sale(&self, amount: PurchaseAmount) -> ProtocolResult<RequestEnvelope> {
        self.purchase(Operation::Sale, amount)
    }

    /// Sale that registers the card for recurring billing.
    pub fn recurring_sale(&self, amount: PurchaseAmount) -> ProtocolResult<RequestEnvelope> {
        self.purchase(Operation::RecurringSale, amount)
    }

    /// Zero-auth request replacing the card on a recurring profile.
    pub fn card_replace(&self) -> ProtocolResult<RequestEnvelope> {
        self.purchase(Operation::CardReplace, PurchaseAmount::zero())
    }

    /// Receipt print. Lines render as `Line1..LineN`.
    pub fn print_receipt(&self, lines: &[String]) -> ProtocolResult<RequestEnvelope> {
        if lines.is_empty() {
            return Err(ProtocolError::InvalidRequest("receipt has no lines".to_string()));
        }
        if lines.len() > MAX_RECEIPT_LINES {
            return Err(ProtocolError::InvalidRequest(format!(
                "receipt has {} lines, at most {} are printable",
                lines.len(),
                MAX_RECEIPT_LINES
            )));
        }

        let payload = RequestPayload::Receipt { lines: lines.len() };

        self.build(Operation::PrintReceipt, payload, |doc, _| {
            doc.field("TerminalID", TERMINAL_ID);
            for (index, line) in lines.iter().enumerate() {
                doc.field(&format!("Line{}", index + 1), line);
            }
        })
    }

    fn purchase(&self, operation: Operation, amount: PurchaseAmount) -> ProtocolResult<RequestEnvelope> {
        // Invoice number is only known once the stamp is resolved
        let mut invoice_no = String::new();

        let mut envelope = self.build(
            operation,
            RequestPayload::None,
            |doc, stamp| {
                invoice_no = stamp.invoice_no.clone();

                doc.field("InvoiceNo", &stamp.invoice_no);
                doc.field("RefNo", &stamp.invoice_no);
                doc.open("Amount");
                doc.field("Purchase", &amount.to_string());
                if operation != Operation::CardReplace {
                    doc.field("Gratuity", "0.00");
                    doc.field("CashBack", "0.00");
                }
                doc.close("Amount");

                match operation {
                    Operation::Sale => {
                        doc.field("ProcessorToken", "TokenRequested");
                        doc.field("CollectData", "CardholderName");
                        doc.field("PartialAuth", "Allow");
                    },
                    Operation::RecurringSale => {
                        doc.field("ProcessorToken", "TokenRequested");
                        doc.field("CollectData", "CardholderName");
                        doc.field("PartialAuth", "Allow");
                        doc.field("CardType", "Credit");
                        doc.field("Frequency", "Recurring");
                        doc.field("RecurringData", "Recurring");
                        doc.field("RecordNo", "RecordNumberRequested");
                        doc.field("CardHolderID", "Allow_V2");
                    },
                    _ => {
                        doc.field("CollectData", "CardholderName");
                        doc.field("Frequency", "Recurring");
                        doc.field("RecordNo", "RecordNumberRequested");
                        doc.field("CardHolderID", "Allow_V2");
                    },
                }
            },
        )?;

        envelope.payload = RequestPayload::Purchase {
            amount,
            invoice_no,
            recurring: operation != Operation::Sale,
        };

        Ok(envelope)
    }

    fn build<F>(&self, operation: Operation, payload: RequestPayload, body: F) -> ProtocolResult<RequestEnvelope>
    where
        F: FnOnce(&mut DocumentWriter, &Stamp<'_>),
    {
        // Fail before touching the counter so a rejected build leaves no gap
        self.config.validate()?;
        let pos_package_id = self.resolve_pos_package_id()?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let stamp = Stamp {
            // Four digits minimum; the counter widens instead of wrapping
            sequence_no: format!("{}{:04}", SEQUENCE_PREFIX, sequence),
            trace_id: format!("{}-{:04}", self.config.operator_id, sequence),
            invoice_no: format!(
                "{:013}{:06}",
                Utc::now().timestamp_millis(),
                sequence % INVOICE_COUNTER_MODULUS
            ),
            pos_package_id,
        };

        let mut doc = DocumentWriter::new(operation.root_element());
        self.write_common(&mut doc, operation, &stamp);
        body(&mut doc, &stamp);
        let document = doc.finish();

        debug!(
            %operation,
            sequence_no = %stamp.sequence_no,
            trace_id = %stamp.trace_id,
            "Built request"
        );

        Ok(RequestEnvelope {
            operation,
            sequence_no: stamp.sequence_no,
            trace_id: stamp.trace_id,
            payload,
            document,
        })
    }

    fn write_common(&self, doc: &mut DocumentWriter, operation: Operation, stamp: &Stamp<'_>) {
        let config = &self.config;

        doc.field("MerchantID", &config.merchant_id);
        doc.field("POSPackageID", &stamp.pos_package_id);
        doc.field("TranCode", operation.tran_code());
        doc.field("SecureDevice", &config.secure_device_name);
        doc.field("OperationMode", config.operation_mode().wire_value());
        doc.field("SequenceNo", &stamp.sequence_no);
        doc.field("OperatorID", OPERATOR_FIELD);
        doc.field("UserTrace", &stamp.trace_id);

        if let Some(pin_pad) = &config.pin_pad {
            doc.field("PinPadIpAddress", &pin_pad.ip_address);
            doc.field("PinPadIpPort", &pin_pad.port.to_string());
        }
    }

    fn resolve_pos_package_id(&self) -> ProtocolResult<Cow<'_, str>> {
        let configured = self.config.pos_package_id.trim();
        if !configured.is_empty() {
            return Ok(Cow::Borrowed(configured));
        }

        if self.config.is_sandbox {
            warn!(default = DEFAULT_POS_PACKAGE_ID, "POS package id not configured, using sandbox default");
            return Ok(Cow::Borrowed(DEFAULT_POS_PACKAGE_ID));
        }

        Err(ProtocolError::ConfigurationInvalid(
            "missing POS package id (required in production)".to_string(),
        ))
    }
}

// =============================================================================
// Document Writer
// =============================================================================

/// Minimal writer for the flat command format.
struct DocumentWriter {
    root: &'static str,
    buf: String,
}

impl DocumentWriter {
    fn new(root: &'static str) -> Self {
        let mut buf = String::with_capacity(1024);
        buf.push_str("<?xml version=\"1.0\"?>\n<TStream>\n<");
        buf.push_str(root);
        buf.push_str(">\n");
        Self { root, buf }
    }

    fn field(&mut self, name: &str, value: &str) {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
        self.buf.push_str(&escape(value));
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push_str(">\n");
    }

    fn open(&mut self, name: &str) {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push_str(">\n");
    }

    fn close(&mut self, name: &str) {
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push_str(">\n");
    }

    fn finish(mut self) -> String {
        let root = self.root;
        self.close(root);
        self.buf.push_str("</TStream>");
        self.buf
    }
}

// =============================================================================
// Tests
// =============================================================================
