//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use emvpad_domain::{TerminalConfig, DEFAULT_POS_PACKAGE_ID};

use crate::error::{OrchestratorError, OrchestratorResult};

const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_EVENT_CAPACITY: usize = 256;
/// Broadcast buffers are allocated up front.
pub const MAX_EVENT_CAPACITY: usize = 65_536;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Terminal configuration stamped onto every command
    pub terminal: TerminalConfig,

    /// Orchestrator runtime configuration
    pub runtime: RuntimeConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Orchestrator runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long to wait for a terminal response before giving up (`None` disables)
    pub response_timeout: Option<Duration>,
    /// Buffered notifications per channel before slow receivers lag
    pub event_capacity: usize,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> OrchestratorResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let terminal = Self::load_terminal_config()?;
        let runtime = Self::load_runtime_config()?;

        Ok(Self {
            terminal,
            runtime,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            terminal: TerminalConfig::new("TEST_MERCHANT", "EMV_TEST_DEVICE", "test_operator"),
            runtime: RuntimeConfig {
                response_timeout: None,
                event_capacity: 64,
            },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> OrchestratorResult<Environment> {
        let env_str = env::var("EMVPAD_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(OrchestratorError::Config(format!(
                "Invalid EMVPAD_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_terminal_config() -> OrchestratorResult<TerminalConfig> {
        let is_sandbox = match env::var("EMVPAD_SANDBOX") {
            Ok(val) => parse_bool("EMVPAD_SANDBOX", &val)?,
            Err(_) => true,
        };

        let pos_package_id = env::var("EMVPAD_POS_PACKAGE_ID").unwrap_or_else(|_| {
            // Production must name its package explicitly; validation below rejects blank
            if is_sandbox {
                DEFAULT_POS_PACKAGE_ID.to_string()
            } else {
                String::new()
            }
        });

        let mut terminal = TerminalConfig::new(
            required_env("EMVPAD_MERCHANT_ID")?,
            required_env("EMVPAD_SECURE_DEVICE")?,
            required_env("EMVPAD_OPERATOR_ID")?,
        )
        .with_pos_package_id(pos_package_id);

        terminal.is_sandbox = is_sandbox;
        terminal.online_merchant_id = env::var("EMVPAD_ONLINE_MERCHANT_ID").ok();

        if let Ok(ip_address) = env::var("EMVPAD_PIN_PAD_IP") {
            let port_str = env::var("EMVPAD_PIN_PAD_PORT").unwrap_or_default();
            let port = port_str.parse::<u16>().map_err(|_| {
                OrchestratorError::Config(format!("Invalid EMVPAD_PIN_PAD_PORT: {}", port_str))
            })?;
            terminal = terminal.with_pin_pad(ip_address, port);
        }

        terminal
            .validate()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        Ok(terminal)
    }

    fn load_runtime_config() -> OrchestratorResult<RuntimeConfig> {
        let timeout_secs = load_number_env("EMVPAD_RESPONSE_TIMEOUT_SECS", DEFAULT_RESPONSE_TIMEOUT_SECS)?;
        let event_capacity = load_number_env("EMVPAD_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY as u64)?;

        let runtime = RuntimeConfig {
            response_timeout: timeout_from_secs(timeout_secs),
            event_capacity: usize::try_from(event_capacity).unwrap_or(usize::MAX),
        };
        runtime.validate()?;

        Ok(runtime)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            terminal: TerminalConfig::new("", "", ""),
            runtime: RuntimeConfig::default(),
            environment: Environment::Development,
        }
    }
}

impl RuntimeConfig {
    /// Check the notification capacity is within `1..=MAX_EVENT_CAPACITY`.
    pub fn validate(&self) -> OrchestratorResult<()> {
        if (1..=MAX_EVENT_CAPACITY).contains(&self.event_capacity) {
            Ok(())
        } else {
            Err(OrchestratorError::Config(format!(
                "EMVPAD_EVENT_CAPACITY must be between 1 and {}, got {}",
                MAX_EVENT_CAPACITY, self.event_capacity
            )))
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            response_timeout: timeout_from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

fn required_env(key: &str) -> OrchestratorResult<String> {
    match env::var(key) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(OrchestratorError::Config(format!("{} is required", key))),
    }
}

fn load_number_env(key: &str, default: u64) -> OrchestratorResult<u64> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map_err(|_| OrchestratorError::Config(format!("Invalid {} value: {}", key, val))),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> OrchestratorResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(OrchestratorError::Config(format!(
            "Invalid {}: {}. Expected true or false",
            key, other
        ))),
    }
}

/// Zero disables the watchdog.
fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

// =============================================================================
// Tests
// =============================================================================
