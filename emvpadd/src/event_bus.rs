//! Notification channels.
//!
//! Two independent channels carry terminal outcomes to the host:
//! - Transaction results (sale, recurring sale, card replacement, card read)
//! - Configuration results (connectivity ping, parameter setup)
//!
//! Each channel has success, error and informational variants. Uses tokio
//! broadcast channels for fan-out to multiple receivers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use emvpad_domain::{
    CardReadResult, CardReplaceResult, RecurringResult, SaleResult, TerminalError,
};

// =============================================================================
// Event Types
// =============================================================================

/// Outcomes on the transaction channel.
///
/// Serialized with the host event name as tag and the result as payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum TransactionEvent {
    /// Sale approved
    #[serde(rename = "onSaleTransactionCompleted")]
    SaleCompleted(SaleResult),

    /// Recurring sale approved
    #[serde(rename = "onRecurringSaleCompleted")]
    RecurringSaleCompleted(RecurringResult),

    /// Card on a recurring profile replaced
    #[serde(rename = "onReplaceCardCompleted")]
    CardReplaceCompleted(CardReplaceResult),

    /// Card data collected
    #[serde(rename = "onCardReadSuccessfully")]
    CardReadSuccessfully(CardReadResult),

    /// Card data collection failed or returned unusable data
    #[serde(rename = "onCardReadFailed")]
    CardReadFailed(TerminalError),

    /// Sale, recurring sale or card replacement failed
    #[serde(rename = "onError")]
    Error(TerminalError),

    /// Advisory text for the operator; no state impact
    #[serde(rename = "onShowMessage")]
    ShowMessage(String),
}

/// Outcomes on the configuration channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ConfigEvent {
    /// Terminal answered the connectivity probe
    #[serde(rename = "onConfigPingSuccess")]
    PingSucceeded,

    /// Terminal rejected the connectivity probe
    #[serde(rename = "onConfigPingFailed")]
    PingFailed(TerminalError),

    /// Terminal configured and ready
    #[serde(rename = "onConfigCompleted")]
    Completed,

    /// Configuration failed
    #[serde(rename = "onConfigError")]
    Error(TerminalError),

    /// Advisory text for the operator; no state impact
    #[serde(rename = "onShowMessage")]
    ShowMessage(String),
}

impl TransactionEvent {
    /// Host event name.
    pub fn name(&self) -> &'static str {
        match self {
            TransactionEvent::SaleCompleted(_) => "onSaleTransactionCompleted",
            TransactionEvent::RecurringSaleCompleted(_) => "onRecurringSaleCompleted",
            TransactionEvent::CardReplaceCompleted(_) => "onReplaceCardCompleted",
            TransactionEvent::CardReadSuccessfully(_) => "onCardReadSuccessfully",
            TransactionEvent::CardReadFailed(_) => "onCardReadFailed",
            TransactionEvent::Error(_) => "onError",
            TransactionEvent::ShowMessage(_) => "onShowMessage",
        }
    }

    /// True for advisory messages.
    pub fn is_informational(&self) -> bool {
        matches!(self, TransactionEvent::ShowMessage(_))
    }
}

impl ConfigEvent {
    /// Host event name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigEvent::PingSucceeded => "onConfigPingSuccess",
            ConfigEvent::PingFailed(_) => "onConfigPingFailed",
            ConfigEvent::Completed => "onConfigCompleted",
            ConfigEvent::Error(_) => "onConfigError",
            ConfigEvent::ShowMessage(_) => "onShowMessage",
        }
    }

    /// True for advisory messages.
    pub fn is_informational(&self) -> bool {
        matches!(self, ConfigEvent::ShowMessage(_))
    }
}

/// An event stamped with the time it was published.
#[derive(Debug, Clone, Serialize)]
pub struct Notification<E> {
    /// The event
    #[serde(flatten)]
    pub event: E,
    /// When the orchestrator published it
    pub published_at: DateTime<Utc>,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast channel for one kind of notification.
///
/// Multiple consumers can receive. Uses broadcast channels for fan-out pattern.
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<Notification<E>>,
}

impl<E: Clone> EventBus<E> {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active receivers.
    pub fn send(&self, event: E) -> usize {
        let notification = Notification {
            event,
            published_at: Utc::now(),
        };
        // send() returns Err if there are no receivers, but we don't care
        self.sender.send(notification).unwrap_or(0)
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will receive all events sent after subscription.
    pub fn subscribe(&self) -> EventReceiver<E> {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for notifications.
pub struct EventReceiver<E: Clone> {
    receiver: broadcast::Receiver<Notification<E>>,
}

impl<E: Clone> EventReceiver<E> {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<Notification<E>, String>> {
        match self.receiver.recv().await {
            Ok(notification) => Some(Ok(notification)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<Notification<E>, String>> {
        match self.receiver.try_recv() {
            Ok(notification) => Some(Ok(notification)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// The two notification channels.
pub struct Notifications {
    /// Transaction results
    pub transactions: EventBus<TransactionEvent>,
    /// Configuration results
    pub config: EventBus<ConfigEvent>,
}

impl Notifications {
    /// Create both channels with the same capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            transactions: EventBus::new(capacity),
            config: EventBus::new(capacity),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
