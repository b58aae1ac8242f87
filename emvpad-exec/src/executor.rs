//! Executor: submits command documents through the terminal transport.
//!
//! The Executor is the bridge between the pure protocol layer (documents) and
//! the impure transport (I/O). Every operation submits and returns; completion
//! is signalled later through the single registered response listener.
//!
//! # Flow
//!
//! ```text
//! Orchestrator → Executor → RequestBuilder → TerminalTransport
//! ```
//!
//! # Connection lease
//!
//! An executor holds a process-wide lease on its transport's connection id for
//! as long as it lives. Building a second executor over the same connection
//! fails with [`ExecError::Config`].

use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use tracing::{debug, info, warn};

use emvpad_domain::TerminalConfig;
use emvpad_protocol::{Operation, RequestBuilder, RequestEnvelope};

use crate::error::{ExecError, ExecResult};
use crate::ports::{ResponseListener, TerminalTransport};

// =============================================================================
// Connection Lease
// =============================================================================

static ACTIVE_CONNECTIONS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a terminal connection, released on drop.
struct ConnectionLease {
    connection_id: String,
}

impl ConnectionLease {
    fn acquire(connection_id: &str) -> ExecResult<Self> {
        let mut active = ACTIVE_CONNECTIONS.lock().unwrap_or_else(PoisonError::into_inner);

        if !active.insert(connection_id.to_string()) {
            return Err(ExecError::Config(format!(
                "terminal connection {} already has a live executor",
                connection_id
            )));
        }

        Ok(Self {
            connection_id: connection_id.to_string(),
        })
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let mut active = ACTIVE_CONNECTIONS.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.connection_id);
        debug!(connection_id = %self.connection_id, "Terminal connection released");
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Submits terminal commands.
///
/// The Executor:
/// 1. Builds reset, parameter download, card collection and receipt documents
/// 2. Submits prebuilt monetary envelopes after checking their operation
/// 3. Keeps exactly one response listener registered
/// 4. Forwards cancel requests, swallowing transport complaints
pub struct Executor<T: TerminalTransport> {
    /// Transport handle
    transport: Arc<T>,
    /// Request builder (owns the sequence counter)
    builder: RequestBuilder,
    /// Held for the executor's lifetime
    _lease: ConnectionLease,
}

impl<T: TerminalTransport> Executor<T> {
    /// Create a new executor.
    ///
    /// # Errors
    ///
    /// - `ExecError::Protocol` if the configuration is invalid
    /// - `ExecError::Config` if the connection already has a live executor
    pub fn new(transport: Arc<T>, config: TerminalConfig) -> ExecResult<Self> {
        config.validate().map_err(emvpad_protocol::ProtocolError::from)?;

        let lease = ConnectionLease::acquire(transport.connection_id())?;

        info!(
            connection_id = %transport.connection_id(),
            mode = %config.operation_mode(),
            merchant_id = %config.merchant_id,
            "Terminal executor ready"
        );

        Ok(Self {
            transport,
            builder: RequestBuilder::new(config),
            _lease: lease,
        })
    }

    /// Request builder, for envelopes the caller submits later.
    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Transport handle.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Register the response listener, replacing any previous one.
    pub fn register_listener(&self, listener: ResponseListener) {
        self.transport.clear_response_listeners();
        self.transport.add_response_listener(listener);
        debug!(connection_id = %self.transport.connection_id(), "Response listener registered");
    }

    /// Drop the response listener.
    pub fn clear_listeners(&self) {
        self.transport.clear_response_listeners();
        debug!(connection_id = %self.transport.connection_id(), "Response listeners cleared");
    }

    /// Submit a pad reset.
    pub async fn reset_pad(&self) -> ExecResult<RequestEnvelope> {
        let envelope = self.builder.pad_reset()?;
        self.submit(&envelope).await?;
        Ok(envelope)
    }

    /// Submit an EMV parameter download.
    pub async fn download_parameters(&self) -> ExecResult<RequestEnvelope> {
        let envelope = self.builder.parameter_download()?;
        self.submit(&envelope).await?;
        Ok(envelope)
    }

    /// Submit a card data collection.
    pub async fn collect_card_data(&self) -> ExecResult<RequestEnvelope> {
        let envelope = self.builder.collect_card_data()?;
        self.submit(&envelope).await?;
        Ok(envelope)
    }

    /// Submit a prebuilt sale envelope.
    pub async fn sell(&self, envelope: &RequestEnvelope) -> ExecResult<()> {
        self.submit_expected(Operation::Sale, envelope).await
    }

    /// Submit a prebuilt recurring sale envelope.
    pub async fn sell_recurring(&self, envelope: &RequestEnvelope) -> ExecResult<()> {
        self.submit_expected(Operation::RecurringSale, envelope).await
    }

    /// Submit a prebuilt card replacement envelope.
    pub async fn replace_card_in_recurring(&self, envelope: &RequestEnvelope) -> ExecResult<()> {
        self.submit_expected(Operation::CardReplace, envelope).await
    }

    /// Submit a receipt print.
    pub async fn print_receipt(&self, lines: &[String]) -> ExecResult<RequestEnvelope> {
        let envelope = self.builder.print_receipt(lines)?;
        self.submit(&envelope).await?;
        Ok(envelope)
    }

    /// Ask the terminal to abort. Safe with nothing outstanding.
    pub async fn cancel_in_flight(&self) {
        match self.transport.cancel_request().await {
            Ok(()) => info!(connection_id = %self.transport.connection_id(), "Cancel requested"),
            Err(e) => warn!(
                connection_id = %self.transport.connection_id(),
                error = %e,
                "Cancel request rejected by transport"
            ),
        }
    }

    async fn submit_expected(&self, expected: Operation, envelope: &RequestEnvelope) -> ExecResult<()> {
        if envelope.operation != expected {
            return Err(ExecError::EnvelopeMismatch {
                expected,
                actual: envelope.operation,
            });
        }
        self.submit(envelope).await
    }

    async fn submit(&self, envelope: &RequestEnvelope) -> ExecResult<()> {
        info!(
            operation = %envelope.operation,
            sequence_no = %envelope.sequence_no,
            trace_id = %envelope.trace_id,
            "Submitting request"
        );

        self.transport.process_transaction(&envelope.document).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubTerminal;
    use emvpad_domain::PurchaseAmount;
    use emvpad_protocol::read_field;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> TerminalConfig {
        TerminalConfig::new("MERCHANT01", "EMV_TEST_DEVICE", "op7")
    }

    fn create_executor() -> (Executor<StubTerminal>, Arc<StubTerminal>) {
        let terminal = Arc::new(StubTerminal::new());
        let executor = Executor::new(terminal.clone(), config()).unwrap();
        (executor, terminal)
    }

    #[tokio::test]
    async fn test_reset_pad_submits_document() {
        let (executor, terminal) = create_executor();

        let envelope = executor.reset_pad().await.unwrap();

        assert_eq!(terminal.submitted(), vec![envelope.document.clone()]);
        assert_eq!(terminal.submitted_tran_codes(), vec!["EMVPadReset".to_string()]);
    }

    #[tokio::test]
    async fn test_each_operation_uses_its_tran_code() {
        let (executor, terminal) = create_executor();
        let amount = PurchaseAmount::parse("3.00").unwrap();

        executor.download_parameters().await.unwrap();
        executor.collect_card_data().await.unwrap();
        executor.sell(&executor.builder().sale(amount).unwrap()).await.unwrap();
        executor
            .sell_recurring(&executor.builder().recurring_sale(amount).unwrap())
            .await
            .unwrap();
        executor
            .replace_card_in_recurring(&executor.builder().card_replace().unwrap())
            .await
            .unwrap();
        executor.print_receipt(&["THANK YOU".to_string()]).await.unwrap();

        assert_eq!(
            terminal.submitted_tran_codes(),
            vec!["EMVParamDownload", "GetPrePaidStripe", "EMVSale", "EMVSale", "EMVZeroAuth", "PrintReceipt"]
        );
    }

    #[tokio::test]
    async fn test_envelope_mismatch_is_rejected() {
        let (executor, terminal) = create_executor();
        let envelope = executor.builder().card_replace().unwrap();

        let result = executor.sell(&envelope).await;

        assert!(matches!(
            result,
            Err(ExecError::EnvelopeMismatch {
                expected: Operation::Sale,
                actual: Operation::CardReplace
            })
        ));
        assert!(terminal.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let (executor, terminal) = create_executor();
        terminal.set_fail_next(true);

        let result = executor.reset_pad().await;
        assert!(matches!(result, Err(ExecError::Transport(_))));

        // Next call should succeed
        assert!(executor.reset_pad().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_with_nothing_outstanding_is_harmless() {
        let (executor, terminal) = create_executor();

        executor.cancel_in_flight().await;
        terminal.set_fail_next(true);
        executor.cancel_in_flight().await;

        assert_eq!(terminal.cancel_count(), 2);
    }

    #[tokio::test]
    async fn test_register_listener_replaces_previous() {
        let (executor, terminal) = create_executor();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        executor.register_listener(Arc::new(move |_: String| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = second.clone();
        executor.register_listener(Arc::new(move |_: String| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        terminal.deliver("<CmdStatus>Success</CmdStatus>");

        assert_eq!(terminal.listener_count(), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        executor.clear_listeners();
        assert_eq!(terminal.listener_count(), 0);
    }

    #[test]
    fn test_second_executor_on_same_connection_fails() {
        let terminal = Arc::new(StubTerminal::new());

        let first = Executor::new(terminal.clone(), config()).unwrap();
        let second = Executor::new(terminal.clone(), config());
        assert!(matches!(second, Err(ExecError::Config(_))));

        // Lease is released with the executor
        drop(first);
        assert!(Executor::new(terminal, config()).is_ok());
    }

    #[test]
    fn test_invalid_config_is_rejected_before_lease() {
        let terminal = Arc::new(StubTerminal::new());
        let mut bad = config();
        bad.operator_id.clear();

        assert!(matches!(
            Executor::new(terminal.clone(), bad),
            Err(ExecError::Protocol(emvpad_protocol::ProtocolError::ConfigurationInvalid(_)))
        ));
        assert!(Executor::new(terminal, config()).is_ok());
    }

    #[tokio::test]
    async fn test_sequence_numbers_flow_into_documents() {
        let (executor, _terminal) = create_executor();

        let first = executor.reset_pad().await.unwrap();
        let second = executor.reset_pad().await.unwrap();

        assert_eq!(read_field(&first.document, "SequenceNo").as_deref(), Some("0010010011"));
        assert_eq!(read_field(&second.document, "SequenceNo").as_deref(), Some("0010010012"));
    }
}
