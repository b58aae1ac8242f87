//! Orchestrator: the single owner of terminal state.
//!
//! One task owns the executor, the state and the watchdog. Caller methods,
//! terminal responses and watchdog expiries all arrive on one command queue,
//! so transitions are strictly serialized.
//!
//! # Flow
//!
//! ```text
//! caller ──Start──→ ┐
//! listener ─Response→ ├→ command queue → OrchestratorActor ─→ Executor → transport
//! watchdog ─Expired──→ ┘                      │
//!                                             └─→ Notifications (transaction / config)
//! ```
//!
//! Every caller-initiated operation except ping and configuration is preceded
//! by a pad reset; the operation's request is submitted only once the reset
//! succeeds. Ping and configuration use the reset itself as the probe.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use emvpad_domain::{PurchaseAmount, TerminalConfig, TerminalError};
use emvpad_exec::{ExecError, Executor, StubTerminal, TerminalTransport};
use emvpad_protocol::{
    classify, extract_card_read, extract_card_replace, extract_recurring, extract_sale,
    Classification, RequestEnvelope, ResponseDocument, MALFORMED_RESPONSE_CODE,
    MISSING_PARAMETERS_CODE, REQUEST_REJECTED_CODE, TIMEOUT_CODE, TRANSPORT_FAILURE_CODE,
};

use crate::config::{Config, RuntimeConfig};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::event_bus::{ConfigEvent, EventReceiver, Notifications, TransactionEvent};
use crate::state::{Channel, OrchestratorState, PendingOperation};

/// Shown while the terminal downloads its EMV parameters.
pub const PARAMETER_DOWNLOAD_MESSAGE: &str = "Downloading terminal parameters, please wait.";

/// Shown on the transaction channel when the caller cancels.
pub const TRANSACTION_CANCELLED_MESSAGE: &str = "Transaction cancelled.";

/// Shown on the configuration channel when the caller cancels.
pub const CONFIGURATION_CANCELLED_MESSAGE: &str = "Configuration cancelled.";

/// Automatic parameter downloads per configuration run.
const MAX_PARAMETER_DOWNLOADS: u8 = 1;

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug)]
enum Intent {
    Ping,
    EnsureConfigured,
    CollectCardData,
    Sale(PurchaseAmount),
    RecurringSale(PurchaseAmount),
    ReplaceCard,
}

enum Command {
    Start {
        intent: Intent,
        reply: oneshot::Sender<OrchestratorResult<()>>,
    },
    PrintReceipt {
        lines: Vec<String>,
        reply: oneshot::Sender<OrchestratorResult<()>>,
    },
    Cancel {
        reply: oneshot::Sender<()>,
    },
    State {
        reply: oneshot::Sender<OrchestratorState>,
    },
    Response(String),
    WatchdogExpired {
        epoch: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Request to put on the wire next.
enum Step {
    PadReset,
    ParameterDownload,
    CollectCardData,
    Sale(RequestEnvelope),
    RecurringSale(RequestEnvelope),
    CardReplace(RequestEnvelope),
}

impl From<PendingOperation> for Step {
    fn from(pending: PendingOperation) -> Self {
        match pending {
            PendingOperation::CollectCardData => Step::CollectCardData,
            PendingOperation::Sale(envelope) => Step::Sale(envelope),
            PendingOperation::RecurringSale(envelope) => Step::RecurringSale(envelope),
            PendingOperation::CardReplace(envelope) => Step::CardReplace(envelope),
        }
    }
}

// =============================================================================
// Orchestrator Handle
// =============================================================================

/// Cloneable handle to a running orchestrator.
///
/// Methods return once the request is on the wire; outcomes arrive on the
/// notification channels. Dropping every handle stops the orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    commands: mpsc::UnboundedSender<Command>,
    notifications: Arc<Notifications>,
}

impl Orchestrator {
    /// Start an orchestrator over a transport.
    ///
    /// Validates the terminal configuration, leases the connection, registers
    /// the response listener and spawns the orchestrator task on the current
    /// Tokio runtime.
    pub fn initialize<T>(
        transport: Arc<T>,
        terminal: TerminalConfig,
        runtime: &RuntimeConfig,
    ) -> OrchestratorResult<Self>
    where
        T: TerminalTransport + 'static,
    {
        let handle = Handle::try_current()
            .map_err(|e| OrchestratorError::Config(format!("No Tokio runtime: {}", e)))?;

        runtime.validate()?;
        let executor = Executor::new(transport, terminal)?;
        let notifications = Arc::new(Notifications::new(runtime.event_capacity));
        let (commands, receiver) = mpsc::unbounded_channel();

        let listener_commands = commands.downgrade();
        executor.register_listener(Arc::new(move |raw: String| {
            if let Some(commands) = listener_commands.upgrade() {
                let _ = commands.send(Command::Response(raw));
            }
        }));

        let actor = OrchestratorActor {
            executor,
            state: OrchestratorState::Idle,
            notifications: Arc::clone(&notifications),
            response_timeout: runtime.response_timeout,
            commands: commands.downgrade(),
            watchdog: None,
            epoch: 0,
            in_flight_sequence: None,
        };
        handle.spawn(actor.run(receiver));

        Ok(Self {
            commands,
            notifications,
        })
    }

    /// Start an orchestrator over an auto-approving stub terminal.
    pub fn new_stub(config: &Config) -> OrchestratorResult<(Self, Arc<StubTerminal>)> {
        let terminal = Arc::new(StubTerminal::auto_approve());
        let orchestrator = Self::initialize(Arc::clone(&terminal), config.terminal.clone(), &config.runtime)?;
        Ok((orchestrator, terminal))
    }

    /// Probe terminal connectivity with a pad reset.
    pub async fn ping_connectivity(&self) -> OrchestratorResult<()> {
        self.start(Intent::Ping).await
    }

    /// Make sure the terminal holds its EMV parameters, downloading them once
    /// if the terminal reports them missing.
    pub async fn ensure_configured(&self) -> OrchestratorResult<()> {
        self.start(Intent::EnsureConfigured).await
    }

    /// Read card data from the secure device.
    pub async fn collect_card_data(&self) -> OrchestratorResult<()> {
        self.start(Intent::CollectCardData).await
    }

    /// Run a sale for a decimal amount such as `"12.34"`.
    pub async fn sell(&self, amount: &str) -> OrchestratorResult<()> {
        let amount = PurchaseAmount::parse(amount)?;
        self.start(Intent::Sale(amount)).await
    }

    /// Run a sale that also creates a recurring payment profile.
    pub async fn sell_recurring(&self, amount: &str) -> OrchestratorResult<()> {
        let amount = PurchaseAmount::parse(amount)?;
        self.start(Intent::RecurringSale(amount)).await
    }

    /// Replace the card on a recurring profile with a zero-amount authorization.
    pub async fn replace_card_in_recurring(&self) -> OrchestratorResult<()> {
        self.start(Intent::ReplaceCard).await
    }

    /// Abort whatever is outstanding and return to idle.
    pub async fn cancel(&self) -> OrchestratorResult<()> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    /// Print receipt lines on the pad. Only allowed while idle.
    pub async fn print_receipt(&self, lines: Vec<String>) -> OrchestratorResult<()> {
        self.request(|reply| Command::PrintReceipt { lines, reply }).await?
    }

    /// Current orchestrator state.
    pub async fn state(&self) -> OrchestratorResult<OrchestratorState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Subscribe to transaction notifications.
    pub fn subscribe_transactions(&self) -> EventReceiver<TransactionEvent> {
        self.notifications.transactions.subscribe()
    }

    /// Subscribe to configuration notifications.
    pub fn subscribe_config(&self) -> EventReceiver<ConfigEvent> {
        self.notifications.config.subscribe()
    }

    /// Stop the orchestrator task, drop the response listener and release
    /// the connection lease.
    pub async fn shutdown(&self) -> OrchestratorResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn start(&self, intent: Intent) -> OrchestratorResult<()> {
        self.request(|reply| Command::Start { intent, reply }).await?
    }

    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> OrchestratorResult<R> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| OrchestratorError::Shutdown)?;
        response.await.map_err(|_| OrchestratorError::Shutdown)
    }
}

// =============================================================================
// Orchestrator Task
// =============================================================================

struct OrchestratorActor<T: TerminalTransport> {
    executor: Executor<T>,
    state: OrchestratorState,
    notifications: Arc<Notifications>,
    response_timeout: Option<Duration>,
    /// Weak so that dropping every handle stops the task
    commands: mpsc::WeakUnboundedSender<Command>,
    watchdog: Option<CancellationToken>,
    epoch: u64,
    in_flight_sequence: Option<String>,
}

impl<T: TerminalTransport + 'static> OrchestratorActor<T> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(
            connection_id = %self.executor.transport().connection_id(),
            "Orchestrator started"
        );

        let mut shutdown_reply = None;

        while let Some(command) = commands.recv().await {
            match command {
                Command::Start { intent, reply } => {
                    let result = self.start(intent).await;
                    let _ = reply.send(result);
                },
                Command::PrintReceipt { lines, reply } => {
                    let result = self.print_receipt(&lines).await;
                    let _ = reply.send(result);
                },
                Command::Cancel { reply } => {
                    self.cancel().await;
                    let _ = reply.send(());
                },
                Command::State { reply } => {
                    let _ = reply.send(self.state.clone());
                },
                Command::Response(raw) => self.handle_response(&raw).await,
                Command::WatchdogExpired { epoch } => self.handle_watchdog(epoch).await,
                Command::Shutdown { reply } => {
                    shutdown_reply = Some(reply);
                    break;
                },
            }
        }

        self.disarm_watchdog();
        self.executor.clear_listeners();
        info!(state = %self.state, "Orchestrator stopped");

        // Release the connection lease before acknowledging
        drop(self);
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    // -------------------------------------------------------------------------
    // Caller commands
    // -------------------------------------------------------------------------

    async fn start(&mut self, intent: Intent) -> OrchestratorResult<()> {
        if !self.state.is_idle() {
            warn!(state = %self.state, intent = ?intent, "Rejecting operation while another is outstanding");
            return Err(OrchestratorError::OperationInProgress {
                state: self.state.to_string(),
            });
        }

        // Monetary envelopes are built up front so bad configuration fails the call
        let builder = self.executor.builder();
        let state = match intent {
            Intent::Ping => OrchestratorState::PingingConfig,
            Intent::EnsureConfigured => OrchestratorState::RunningConfig {
                parameter_downloads: 0,
            },
            Intent::CollectCardData => OrchestratorState::Resetting {
                next: PendingOperation::CollectCardData,
            },
            Intent::Sale(amount) => OrchestratorState::Resetting {
                next: PendingOperation::Sale(builder.sale(amount)?),
            },
            Intent::RecurringSale(amount) => OrchestratorState::Resetting {
                next: PendingOperation::RecurringSale(builder.recurring_sale(amount)?),
            },
            Intent::ReplaceCard => OrchestratorState::Resetting {
                next: PendingOperation::CardReplace(builder.card_replace()?),
            },
        };

        info!(state = %state, "Starting operation");
        self.state = state;

        if let Err(failure) = self.submit(Step::PadReset).await {
            self.dispatch(Err(failure)).await;
        }
        Ok(())
    }

    async fn print_receipt(&mut self, lines: &[String]) -> OrchestratorResult<()> {
        if !self.state.is_idle() {
            return Err(OrchestratorError::OperationInProgress {
                state: self.state.to_string(),
            });
        }

        let envelope = self.executor.print_receipt(lines).await?;
        info!(sequence_no = %envelope.sequence_no, lines = lines.len(), "Receipt submitted");
        Ok(())
    }

    async fn cancel(&mut self) {
        self.disarm_watchdog();
        let previous = std::mem::take(&mut self.state);
        info!(state = %previous, "Cancelling");

        self.executor.cancel_in_flight().await;

        match previous.channel() {
            Channel::Config => self.publish_config(ConfigEvent::ShowMessage(
                CONFIGURATION_CANCELLED_MESSAGE.to_string(),
            )),
            Channel::Transaction => self.publish_transaction(TransactionEvent::ShowMessage(
                TRANSACTION_CANCELLED_MESSAGE.to_string(),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Terminal responses
    // -------------------------------------------------------------------------

    async fn handle_response(&mut self, raw: &str) {
        debug!(raw = %raw, "Terminal response received");

        if self.state.is_idle() {
            debug!("Ignoring response with nothing outstanding");
            return;
        }

        let document = ResponseDocument::parse(raw);
        let outcome = match classify(&document) {
            Classification::Busy => {
                warn!(state = %self.state, "Terminal busy, cancelling in-flight request");
                self.executor.cancel_in_flight().await;
                return;
            },
            Classification::Error(err) => Err(err),
            Classification::Success(document) => Ok(document),
        };

        self.disarm_watchdog();
        self.log_correlation(&document);
        self.dispatch(outcome).await;
    }

    async fn handle_watchdog(&mut self, epoch: u64) {
        if epoch != self.epoch || self.watchdog.is_none() || self.state.is_idle() {
            debug!(epoch, "Ignoring stale watchdog");
            return;
        }
        self.watchdog = None;

        let secs = self.response_timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
        warn!(state = %self.state, timeout_secs = secs, "No terminal response, cancelling");
        self.executor.cancel_in_flight().await;

        let err = TerminalError::new(
            TIMEOUT_CODE,
            format!("No response from terminal within {}s", secs),
        );
        self.dispatch(Err(err)).await;
    }

    fn log_correlation(&self, document: &ResponseDocument) {
        if let (Some(expected), Some(echoed)) =
            (self.in_flight_sequence.as_deref(), document.non_empty("SequenceNo"))
        {
            if expected != echoed {
                debug!(expected, echoed, "Response sequence number differs from in-flight request");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Apply an outcome, feeding submission failures back in until settled.
    async fn dispatch(&mut self, mut outcome: Result<ResponseDocument, TerminalError>) {
        while let Err(failure) = self.advance(outcome).await {
            outcome = Err(failure);
        }
    }

    /// One transition. Returns the failure of any request submitted on the way.
    async fn advance(&mut self, outcome: Result<ResponseDocument, TerminalError>) -> Result<(), TerminalError> {
        let state = std::mem::take(&mut self.state);

        match (state, outcome) {
            (OrchestratorState::Idle, _) => Ok(()),

            (OrchestratorState::Resetting { next }, Ok(_)) => {
                self.state = next.awaiting_state();
                info!(state = %self.state, "Pad reset complete");
                self.submit(next.into()).await
            },
            (OrchestratorState::Resetting { next }, Err(err)) => {
                // Reset failures are reported as failures of the pending operation
                self.state = next.awaiting_state();
                Err(err)
            },

            (OrchestratorState::PingingConfig, Ok(_)) => {
                info!("Terminal answered ping");
                self.publish_config(ConfigEvent::PingSucceeded);
                Ok(())
            },
            (OrchestratorState::PingingConfig, Err(err)) => {
                warn!(code = %err.code, message = %err.message, "Ping failed");
                self.publish_config(ConfigEvent::PingFailed(err));
                Ok(())
            },

            (OrchestratorState::RunningConfig { .. }, Ok(_)) => {
                info!("Terminal configured");
                self.publish_config(ConfigEvent::Completed);
                Ok(())
            },
            (OrchestratorState::RunningConfig { parameter_downloads }, Err(err))
                if err.code == MISSING_PARAMETERS_CODE && parameter_downloads < MAX_PARAMETER_DOWNLOADS =>
            {
                info!(message = %err.message, "Terminal parameters missing, downloading");
                self.state = OrchestratorState::RunningConfig {
                    parameter_downloads: parameter_downloads + 1,
                };
                self.publish_config(ConfigEvent::ShowMessage(PARAMETER_DOWNLOAD_MESSAGE.to_string()));
                self.submit(Step::ParameterDownload).await
            },
            (OrchestratorState::RunningConfig { .. }, Err(err)) => {
                error!(code = %err.code, message = %err.message, "Configuration failed");
                self.publish_config(ConfigEvent::Error(err));
                Ok(())
            },

            (OrchestratorState::CollectingCardData, Ok(document)) => {
                match extract_card_read(&document) {
                    Ok(card) => {
                        info!("Card data collected");
                        self.publish_transaction(TransactionEvent::CardReadSuccessfully(card));
                    },
                    Err(e) => {
                        error!(error = %e, "Card read response unusable");
                        self.publish_transaction(TransactionEvent::CardReadFailed(TerminalError::new(
                            MALFORMED_RESPONSE_CODE,
                            e.to_string(),
                        )));
                    },
                }
                Ok(())
            },
            (OrchestratorState::CollectingCardData, Err(err)) => {
                warn!(code = %err.code, message = %err.message, "Card read failed");
                self.publish_transaction(TransactionEvent::CardReadFailed(err));
                Ok(())
            },

            (OrchestratorState::RunningSale, Ok(document)) => {
                let sale = extract_sale(&document);
                info!(cmd_status = %sale.cmd_status, invoice_no = %sale.invoice_no, "Sale completed");
                self.publish_transaction(TransactionEvent::SaleCompleted(sale));
                Ok(())
            },
            (OrchestratorState::RunningRecurringSale, Ok(document)) => {
                let recurring = extract_recurring(&document);
                info!(cmd_status = %recurring.sale.cmd_status, "Recurring sale completed");
                self.publish_transaction(TransactionEvent::RecurringSaleCompleted(recurring));
                Ok(())
            },
            (OrchestratorState::ReplacingCard, Ok(document)) => {
                let replaced = extract_card_replace(&document);
                info!(cmd_status = %replaced.sale.cmd_status, "Card replaced");
                self.publish_transaction(TransactionEvent::CardReplaceCompleted(replaced));
                Ok(())
            },
            (
                state @ (OrchestratorState::RunningSale
                | OrchestratorState::RunningRecurringSale
                | OrchestratorState::ReplacingCard),
                Err(err),
            ) => {
                error!(state = %state, code = %err.code, message = %err.message, "Transaction failed");
                self.publish_transaction(TransactionEvent::Error(err));
                Ok(())
            },
        }
    }

    /// Put a request on the wire and arm the watchdog.
    ///
    /// Submission failures come back as terminal errors for [`Self::dispatch`].
    async fn submit(&mut self, step: Step) -> Result<(), TerminalError> {
        let submitted = match step {
            Step::PadReset => self.executor.reset_pad().await,
            Step::ParameterDownload => self.executor.download_parameters().await,
            Step::CollectCardData => self.executor.collect_card_data().await,
            Step::Sale(envelope) => self.executor.sell(&envelope).await.map(|()| envelope),
            Step::RecurringSale(envelope) => self.executor.sell_recurring(&envelope).await.map(|()| envelope),
            Step::CardReplace(envelope) => self
                .executor
                .replace_card_in_recurring(&envelope)
                .await
                .map(|()| envelope),
        };

        match submitted {
            Ok(envelope) => {
                debug!(
                    operation = %envelope.operation,
                    sequence_no = %envelope.sequence_no,
                    trace_id = %envelope.trace_id,
                    "Request submitted"
                );
                self.arm_watchdog(&envelope);
                Ok(())
            },
            Err(e) => {
                error!(state = %self.state, error = %e, "Request submission failed");
                let code = match e {
                    ExecError::Transport(_) => TRANSPORT_FAILURE_CODE,
                    _ => REQUEST_REJECTED_CODE,
                };
                Err(TerminalError::new(code, e.to_string()))
            },
        }
    }

    // -------------------------------------------------------------------------
    // Watchdog
    // -------------------------------------------------------------------------

    fn arm_watchdog(&mut self, envelope: &RequestEnvelope) {
        self.disarm_watchdog();
        self.in_flight_sequence = Some(envelope.sequence_no.clone());

        let Some(timeout) = self.response_timeout else {
            return;
        };

        self.epoch += 1;
        let epoch = self.epoch;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {},
                _ = tokio::time::sleep(timeout) => {
                    if let Some(commands) = commands.upgrade() {
                        let _ = commands.send(Command::WatchdogExpired { epoch });
                    }
                },
            }
        });

        self.watchdog = Some(token);
    }

    fn disarm_watchdog(&mut self) {
        if let Some(token) = self.watchdog.take() {
            token.cancel();
        }
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    fn publish_transaction(&self, event: TransactionEvent) {
        let name = event.name();
        let receivers = self.notifications.transactions.send(event);
        debug!(event = name, receivers, "Transaction notification published");
    }

    fn publish_config(&self, event: ConfigEvent) {
        let name = event.name();
        let receivers = self.notifications.config.send(event);
        debug!(event = name, receivers, "Configuration notification published");
    }
}

// =============================================================================
// Tests
// =============================================================================
