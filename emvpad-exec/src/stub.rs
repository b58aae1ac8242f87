//! Stub implementations for testing.
//!
//! [`StubTerminal`] records every submitted document and cancel request, and
//! delivers responses to its listeners either on demand ([`StubTerminal::deliver`])
//! or automatically through a [`Responder`]. [`StubResponse`] renders response
//! documents in the terminal's format.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use emvpad_protocol::{escape, read_field, ResponseDocument, BUSY_RESPONSE_ORIGIN, BUSY_RETURN_CODE};

use crate::error::ExecError;
use crate::ports::{ResponseListener, TerminalTransport};

/// Computes the response to a submitted document, if any.
pub type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

// =============================================================================
// Stub Terminal
// =============================================================================

/// Stub terminal for testing.
///
/// Responses are delivered synchronously on the caller's task, which keeps
/// test ordering deterministic.
pub struct StubTerminal {
    /// Unique per instance so parallel tests never share a lease
    connection_id: String,
    /// Every submitted document, in order
    submitted: RwLock<Vec<String>>,
    /// Registered response listeners
    listeners: RwLock<Vec<ResponseListener>>,
    /// Number of cancel requests received
    cancel_count: AtomicUsize,
    /// Whether to simulate a transport failure on the next call
    fail_next: RwLock<bool>,
    /// Automatic responses
    responder: RwLock<Option<Responder>>,
}

impl StubTerminal {
    /// Create a stub terminal that never answers on its own.
    pub fn new() -> Self {
        Self {
            connection_id: format!("stub-{}", Uuid::now_v7()),
            submitted: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            cancel_count: AtomicUsize::new(0),
            fail_next: RwLock::new(false),
            responder: RwLock::new(None),
        }
    }

    /// Create a stub terminal that approves every request.
    pub fn auto_approve() -> Self {
        let terminal = Self::new();
        terminal.set_responder(Arc::new(|request: &str| Some(StubResponse::approving(request).render())));
        terminal
    }

    /// Install an automatic responder.
    pub fn set_responder(&self, responder: Responder) {
        *self.responder.write().unwrap_or_else(PoisonError::into_inner) = Some(responder);
    }

    /// Configure the next submit or cancel to fail.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Hand a raw response to every registered listener.
    pub fn deliver(&self, raw: &str) {
        // Clone out so a listener may re-enter the stub
        let listeners: Vec<ResponseListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            listener(raw.to_string());
        }
    }

    /// Documents submitted so far.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `TranCode` of every submitted document.
    pub fn submitted_tran_codes(&self) -> Vec<String> {
        self.submitted()
            .iter()
            .map(|doc| read_field(doc, "TranCode").unwrap_or_default())
            .collect()
    }

    /// Most recently submitted document.
    pub fn last_submitted(&self) -> Option<String> {
        self.submitted.read().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    /// Number of cancel requests received.
    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap_or_else(PoisonError::into_inner);
        let fail = *fail_next;
        *fail_next = false; // Reset after check
        fail
    }
}

impl Default for StubTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TerminalTransport for StubTerminal {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn process_transaction(&self, document: &str) -> Result<(), ExecError> {
        if self.should_fail() {
            return Err(ExecError::Transport("Simulated transport failure".to_string()));
        }

        self.submitted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(document.to_string());

        let responder = self.responder.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(response) = responder.and_then(|respond| respond(document)) {
            self.deliver(&response);
        }

        Ok(())
    }

    async fn cancel_request(&self) -> Result<(), ExecError> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail() {
            return Err(ExecError::Transport("Simulated cancel failure".to_string()));
        }

        tracing::debug!(connection_id = %self.connection_id, "Stub: request cancelled");
        Ok(())
    }

    fn add_response_listener(&self, listener: ResponseListener) {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner).push(listener);
    }

    fn clear_response_listeners(&self) {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// =============================================================================
// Stub Response
// =============================================================================

/// Response document builder.
#[derive(Debug, Clone)]
pub struct StubResponse {
    origin: String,
    return_code: String,
    status: String,
    text: String,
    fields: Vec<(String, String)>,
}

impl StubResponse {
    /// Processor-side response with the given status.
    pub fn with_status(status: &str) -> Self {
        Self {
            origin: "Processor".to_string(),
            return_code: "000000".to_string(),
            status: status.to_string(),
            text: status.to_uppercase(),
            fields: Vec::new(),
        }
    }

    /// `CmdStatus` Success (admin commands).
    pub fn success() -> Self {
        Self::with_status("Success")
    }

    /// `CmdStatus` Approved (monetary commands).
    pub fn approved() -> Self {
        Self::with_status("Approved")
    }

    /// `CmdStatus` Error with the given code and text.
    pub fn error(return_code: &str, text: &str) -> Self {
        Self {
            origin: "Client".to_string(),
            return_code: return_code.to_string(),
            status: "Error".to_string(),
            text: text.to_string(),
            fields: Vec::new(),
        }
    }

    /// Terminal busy with another transaction.
    pub fn busy() -> Self {
        let mut response = Self::error(BUSY_RETURN_CODE, "In Process with Other Client");
        response.origin = BUSY_RESPONSE_ORIGIN.to_string();
        response
    }

    /// Add a transaction field.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Approval echoing the request's correlation fields and amount.
    ///
    /// Card data collection requests get a complete set of card fields.
    pub fn approving(request: &str) -> Self {
        let request = ResponseDocument::parse(request);
        let tran_code = request.field_or("TranCode", "");

        let mut response = match tran_code.as_str() {
            "EMVSale" | "EMVZeroAuth" => Self::approved(),
            _ => Self::success(),
        };

        for name in ["SequenceNo", "UserTrace", "TranCode", "MerchantID", "InvoiceNo", "RefNo"] {
            if let Some(value) = request.field(name) {
                response = response.field(name, value);
            }
        }

        match tran_code.as_str() {
            "EMVSale" | "EMVZeroAuth" => {
                let purchase = request.field_or("Purchase", "0.00");
                response
                    .field("Purchase", &purchase)
                    .field("Authorize", &purchase)
                    .field("AcctNo", "************0060")
                    .field("CardType", "M/C")
                    .field("AuthCode", "30158P")
                    .field("CaptureStatus", "Captured")
                    .field("EntryMethod", "CHIP")
                    .field("RecordNo", "STUB-RECORD")
                    .field("CardHolderID", "STUB-HOLDER")
                    .field("CardholderName", "TEST/CARD")
                    .field("RecurringData", request.field("RecurringData").unwrap_or(""))
            },
            "GetPrePaidStripe" => response
                .field("CardholderName", "TEST/CARD")
                .field("ExpDateMonth", "12")
                .field("ExpDateYear", "29")
                .field("CardBin", "541333")
                .field("Last4", "0060"),
            _ => response,
        }
    }

    /// Render the response document.
    pub fn render(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\"?>\n<RStream>\n<CmdResponse>\n");
        push_field(&mut out, "ResponseOrigin", &self.origin);
        push_field(&mut out, "DSIXReturnCode", &self.return_code);
        push_field(&mut out, "CmdStatus", &self.status);
        push_field(&mut out, "TextResponse", &self.text);
        out.push_str("</CmdResponse>\n<TranResponse>\n");

        let (amounts, others): (Vec<_>, Vec<_>) = self
            .fields
            .iter()
            .partition(|(name, _)| matches!(name.as_str(), "Purchase" | "Gratuity" | "Authorize" | "CashBack"));

        for (name, value) in others {
            push_field(&mut out, name, value);
        }
        if !amounts.is_empty() {
            out.push_str("<Amount>\n");
            for (name, value) in amounts {
                push_field(&mut out, name, value);
            }
            out.push_str("</Amount>\n");
        }

        out.push_str("</TranResponse>\n</RStream>");
        out
    }
}

fn push_field(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("<{name}>{}</{name}>\n", escape(value)));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use emvpad_protocol::{classify, is_busy, Classification};

    #[tokio::test]
    async fn test_records_submissions_in_order() {
        let terminal = StubTerminal::new();

        terminal.process_transaction("<TranCode>EMVPadReset</TranCode>").await.unwrap();
        terminal.process_transaction("<TranCode>EMVSale</TranCode>").await.unwrap();

        assert_eq!(terminal.submitted_tran_codes(), vec!["EMVPadReset", "EMVSale"]);
        assert_eq!(terminal.last_submitted().as_deref(), Some("<TranCode>EMVSale</TranCode>"));
    }

    #[tokio::test]
    async fn test_simulated_failure_is_one_shot() {
        let terminal = StubTerminal::new();
        terminal.set_fail_next(true);

        assert!(terminal.process_transaction("<TranCode>EMVPadReset</TranCode>").await.is_err());
        assert!(terminal.submitted().is_empty());

        // Next call should succeed
        assert!(terminal.process_transaction("<TranCode>EMVPadReset</TranCode>").await.is_ok());
    }

    #[tokio::test]
    async fn test_auto_approve_delivers_to_listeners() {
        let terminal = StubTerminal::auto_approve();
        let received = Arc::new(RwLock::new(Vec::new()));

        let sink = received.clone();
        terminal.add_response_listener(Arc::new(move |raw: String| sink.write().unwrap().push(raw)));

        terminal
            .process_transaction("<TranCode>EMVSale</TranCode><Purchase>4.20</Purchase><InvoiceNo>77</InvoiceNo>")
            .await
            .unwrap();

        let received = received.read().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(read_field(&received[0], "Purchase").as_deref(), Some("4.20"));
        assert_eq!(read_field(&received[0], "InvoiceNo").as_deref(), Some("77"));
        assert_eq!(read_field(&received[0], "CmdStatus").as_deref(), Some("Approved"));
    }

    #[test]
    fn test_busy_response_classifies_as_busy() {
        let doc = ResponseDocument::parse(&StubResponse::busy().render());

        assert!(is_busy(&doc));
        assert_eq!(classify(&doc), Classification::Busy);
    }

    #[test]
    fn test_error_response_classifies_as_error() {
        let doc = ResponseDocument::parse(&StubResponse::error("000002", "Params").render());

        match classify(&doc) {
            Classification::Error(err) => assert_eq!(err.code, "000002"),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_card_data_approval_has_card_fields() {
        let raw = StubResponse::approving("<TranCode>GetPrePaidStripe</TranCode>").render();
        let doc = ResponseDocument::parse(&raw);

        assert_eq!(doc.field("CardBin"), Some("541333"));
        assert_eq!(doc.field("Last4"), Some("0060"));
    }

    #[test]
    fn test_field_values_are_escaped() {
        let raw = StubResponse::approved()
            .field("CardholderName", "TEST & CO <VIP>")
            .render();
        let doc = ResponseDocument::parse(&raw);

        assert!(raw.contains("TEST &amp; CO &lt;VIP&gt;"));
        assert_eq!(doc.field("CardholderName"), Some("TEST & CO <VIP>"));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(StubTerminal::new().connection_id(), StubTerminal::new().connection_id());
    }
}
