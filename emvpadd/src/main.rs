//! EMV Pad Orchestrator Daemon
//!
//! Runs the orchestrator against the in-memory stub terminal, probes it,
//! configures it and logs every notification as JSON.
//!
//! # Usage
//!
//! ```bash
//! EMVPAD_MERCHANT_ID=M1 EMVPAD_SECURE_DEVICE=EMV_DEVICE EMVPAD_OPERATOR_ID=op cargo run -p emvpadd
//! ```
//!
//! # Environment Variables
//!
//! - `EMVPAD_ENV`: Environment (test, development, production)
//! - `EMVPAD_MERCHANT_ID`, `EMVPAD_SECURE_DEVICE`, `EMVPAD_OPERATOR_ID`: Required
//! - `EMVPAD_SANDBOX`: Certification mode (default: true)
//! - `EMVPAD_POS_PACKAGE_ID`: Required outside sandbox
//! - `EMVPAD_PIN_PAD_IP` / `EMVPAD_PIN_PAD_PORT`: Network pin pad address
//! - `EMVPAD_RESPONSE_TIMEOUT_SECS`: Watchdog (default: 120, 0 disables)
//! - `EMVPAD_EVENT_CAPACITY`: Notification buffer (default: 256)

use emvpadd::{Config, ConfigEvent, Orchestrator};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("emvpadd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        mode = %config.terminal.operation_mode(),
        merchant_id = %config.terminal.merchant_id,
        "EMV Pad Orchestrator"
    );

    let (orchestrator, _terminal) = Orchestrator::new_stub(&config)?;
    let mut config_events = orchestrator.subscribe_config();
    let mut transactions = orchestrator.subscribe_transactions();

    orchestrator.ping_connectivity().await?;

    loop {
        tokio::select! {
            Some(received) = config_events.recv() => match received {
                Ok(notification) => {
                    info!(notification = %serde_json::to_string(&notification)?, "Configuration notification");
                    if notification.event == ConfigEvent::PingSucceeded {
                        orchestrator.ensure_configured().await?;
                    }
                },
                Err(e) => warn!(error = %e, "Configuration notifications lagged"),
            },
            Some(received) = transactions.recv() => match received {
                Ok(notification) => {
                    info!(notification = %serde_json::to_string(&notification)?, "Transaction notification");
                },
                Err(e) => warn!(error = %e, "Transaction notifications lagged"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            },
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}
