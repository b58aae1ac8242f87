//! Orchestrator state.
//!
//! Exactly one value is active per orchestrator. It is created at `Idle` and
//! only the orchestrator task mutates it.
//!
//! # Transitions
//!
//! ```text
//! Idle ──ping──────────────→ PingingConfig ──response──→ Idle
//! Idle ──ensure_configured─→ RunningConfig{0} ──000002──→ RunningConfig{1} ──response──→ Idle
//! Idle ──sale/recurring/───→ Resetting{next} ──success──→ RunningSale / RunningRecurringSale /
//!        replace/collect                                  ReplacingCard / CollectingCardData
//!                                                         ──response──→ Idle
//! any  ──cancel / timeout──→ Idle
//! ```

use std::fmt;

use emvpad_protocol::RequestEnvelope;

/// Operation waiting for the pad reset to complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOperation {
    /// Card data collection
    CollectCardData,
    /// Prebuilt sale
    Sale(RequestEnvelope),
    /// Prebuilt recurring sale
    RecurringSale(RequestEnvelope),
    /// Prebuilt zero-auth card replacement
    CardReplace(RequestEnvelope),
}

impl PendingOperation {
    /// Result channel the operation reports on.
    pub fn channel(&self) -> Channel {
        Channel::Transaction
    }

    /// State entered once the operation's request is submitted.
    pub fn awaiting_state(&self) -> OrchestratorState {
        match self {
            PendingOperation::CollectCardData => OrchestratorState::CollectingCardData,
            PendingOperation::Sale(_) => OrchestratorState::RunningSale,
            PendingOperation::RecurringSale(_) => OrchestratorState::RunningRecurringSale,
            PendingOperation::CardReplace(_) => OrchestratorState::ReplacingCard,
        }
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingOperation::CollectCardData => write!(f, "collect_card_data"),
            PendingOperation::Sale(_) => write!(f, "sale"),
            PendingOperation::RecurringSale(_) => write!(f, "recurring_sale"),
            PendingOperation::CardReplace(_) => write!(f, "card_replace"),
        }
    }
}

/// Notification channel an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Connectivity and parameter setup
    Config,
    /// Card reads and monetary operations
    Transaction,
}

/// Orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    /// Nothing outstanding
    #[default]
    Idle,
    /// Pad reset submitted; `next` is submitted once it succeeds
    Resetting { next: PendingOperation },
    /// Connectivity probe submitted
    PingingConfig,
    /// Configuration probe submitted; counts automatic parameter downloads
    RunningConfig { parameter_downloads: u8 },
    /// Card data collection submitted
    CollectingCardData,
    /// Sale submitted
    RunningSale,
    /// Recurring sale submitted
    RunningRecurringSale,
    /// Card replacement submitted
    ReplacingCard,
}

impl OrchestratorState {
    /// True when no operation is outstanding.
    pub fn is_idle(&self) -> bool {
        matches!(self, OrchestratorState::Idle)
    }

    /// Result channel for the outstanding operation.
    pub fn channel(&self) -> Channel {
        match self {
            OrchestratorState::PingingConfig | OrchestratorState::RunningConfig { .. } => Channel::Config,
            OrchestratorState::Resetting { next } => next.channel(),
            _ => Channel::Transaction,
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Idle => write!(f, "idle"),
            OrchestratorState::Resetting { next } => write!(f, "resetting (then {})", next),
            OrchestratorState::PingingConfig => write!(f, "pinging_config"),
            OrchestratorState::RunningConfig { parameter_downloads } => {
                write!(f, "running_config (downloads: {})", parameter_downloads)
            },
            OrchestratorState::CollectingCardData => write!(f, "collecting_card_data"),
            OrchestratorState::RunningSale => write!(f, "running_sale"),
            OrchestratorState::RunningRecurringSale => write!(f, "running_recurring_sale"),
            OrchestratorState::ReplacingCard => write!(f, "replacing_card"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert!(OrchestratorState::default().is_idle());
        assert!(!OrchestratorState::RunningSale.is_idle());
    }

    #[test]
    fn test_channels() {
        assert_eq!(OrchestratorState::PingingConfig.channel(), Channel::Config);
        assert_eq!(
            OrchestratorState::RunningConfig { parameter_downloads: 1 }.channel(),
            Channel::Config
        );
        assert_eq!(OrchestratorState::CollectingCardData.channel(), Channel::Transaction);
        assert_eq!(
            OrchestratorState::Resetting { next: PendingOperation::CollectCardData }.channel(),
            Channel::Transaction
        );
        assert_eq!(OrchestratorState::Idle.channel(), Channel::Transaction);
    }

    #[test]
    fn test_awaiting_states() {
        assert_eq!(
            PendingOperation::CollectCardData.awaiting_state(),
            OrchestratorState::CollectingCardData
        );
    }

    #[test]
    fn test_display() {
        let state = OrchestratorState::Resetting { next: PendingOperation::CollectCardData };
        assert_eq!(state.to_string(), "resetting (then collect_card_data)");
    }
}
