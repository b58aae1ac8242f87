//! Terminal configuration.
//!
//! Supplied once when the orchestrator is initialized and stamped onto every
//! outgoing command. Never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::DomainError;

/// POS package id used when a sandbox configuration leaves it blank.
pub const DEFAULT_POS_PACKAGE_ID: &str = "dsiEMVAndroid:1.0";

// =============================================================================
// Operation Mode
// =============================================================================

/// Whether commands target the certification host or the live processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    /// Certification (sandbox) host
    Sandbox,
    /// Live processor
    Production,
}

impl OperationMode {
    /// Value rendered into the `OperationMode` field.
    pub fn wire_value(&self) -> &'static str {
        match self {
            OperationMode::Sandbox => "CERT",
            OperationMode::Production => "PROD",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Sandbox => write!(f, "sandbox"),
            OperationMode::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Terminal Config
// =============================================================================

/// Network address of a pin pad reached over IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinPadAddress {
    /// IP address of the pin pad
    pub ip_address: String,
    /// TCP port of the pin pad
    pub port: u16,
}

/// Immutable terminal configuration.
///
/// # Invariants (checked by [`TerminalConfig::validate`])
/// - merchant id, secure device name and operator id are non-blank
/// - production mode requires an explicit POS package id
/// - a pin pad address, when present, has a non-blank IP and a non-zero port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalConfig {
    /// Merchant id issued by the processor
    pub merchant_id: String,
    /// Merchant id used for card-not-present traffic
    #[serde(default)]
    pub online_merchant_id: Option<String>,
    /// Sandbox (certification) or production
    #[serde(default = "default_sandbox")]
    pub is_sandbox: bool,
    /// Secure device identifier of the attached terminal
    pub secure_device_name: String,
    /// Operator (employee) id, used to derive trace ids
    pub operator_id: String,
    /// POS package identifier
    #[serde(default)]
    pub pos_package_id: String,
    /// Optional pin pad network address
    #[serde(default)]
    pub pin_pad: Option<PinPadAddress>,
}

fn default_sandbox() -> bool {
    true
}

impl TerminalConfig {
    /// Create a sandbox configuration with the default POS package id.
    pub fn new(
        merchant_id: impl Into<String>,
        secure_device_name: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            online_merchant_id: None,
            is_sandbox: true,
            secure_device_name: secure_device_name.into(),
            operator_id: operator_id.into(),
            pos_package_id: DEFAULT_POS_PACKAGE_ID.to_string(),
            pin_pad: None,
        }
    }

    /// Switch to production mode.
    pub fn with_production(mut self) -> Self {
        self.is_sandbox = false;
        self
    }

    /// Set the POS package id.
    pub fn with_pos_package_id(mut self, pos_package_id: impl Into<String>) -> Self {
        self.pos_package_id = pos_package_id.into();
        self
    }

    /// Set the online merchant id.
    pub fn with_online_merchant_id(mut self, online_merchant_id: impl Into<String>) -> Self {
        self.online_merchant_id = Some(online_merchant_id.into());
        self
    }

    /// Reach the pin pad over the network.
    pub fn with_pin_pad(mut self, ip_address: impl Into<String>, port: u16) -> Self {
        self.pin_pad = Some(PinPadAddress {
            ip_address: ip_address.into(),
            port,
        });
        self
    }

    /// Operation mode derived from the sandbox flag.
    pub fn operation_mode(&self) -> OperationMode {
        if self.is_sandbox {
            OperationMode::Sandbox
        } else {
            OperationMode::Production
        }
    }

    /// Check every required field.
    ///
    /// # Errors
    /// Returns `DomainError::ConfigurationInvalid` naming the first offending field
    pub fn validate(&self) -> Result<(), DomainError> {
        require("merchant id", &self.merchant_id)?;
        require("secure device name", &self.secure_device_name)?;
        require("operator id", &self.operator_id)?;

        if !self.is_sandbox {
            require("POS package id (required in production)", &self.pos_package_id)?;
        }

        if let Some(pin_pad) = &self.pin_pad {
            require("pin pad IP address", &pin_pad.ip_address)?;
            if pin_pad.port == 0 {
                return Err(DomainError::ConfigurationInvalid(
                    "pin pad port must be non-zero".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::ConfigurationInvalid(format!("missing {}", field)));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> TerminalConfig {
        TerminalConfig::new("MERCHANT01", "EMV_A920PRO_DATACAP_E2E", "operator_001")
    }

    #[test]
    fn test_new_is_sandbox_with_default_package() {
        let config = sandbox();

        assert!(config.is_sandbox);
        assert_eq!(config.operation_mode(), OperationMode::Sandbox);
        assert_eq!(config.pos_package_id, DEFAULT_POS_PACKAGE_ID);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_operation_mode_wire_values() {
        assert_eq!(OperationMode::Sandbox.wire_value(), "CERT");
        assert_eq!(OperationMode::Production.wire_value(), "PROD");
        assert_eq!(sandbox().with_production().operation_mode().wire_value(), "PROD");
    }

    #[test]
    fn test_missing_merchant_is_invalid() {
        let mut config = sandbox();
        config.merchant_id = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err, DomainError::ConfigurationInvalid("missing merchant id".to_string()));
    }

    #[test]
    fn test_production_requires_pos_package() {
        let config = sandbox().with_production().with_pos_package_id("");
        assert!(matches!(config.validate(), Err(DomainError::ConfigurationInvalid(_))));

        // Sandbox tolerates a blank package id; the request builder substitutes the default
        let config = sandbox().with_pos_package_id("");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pin_pad_port_must_be_set() {
        let config = sandbox().with_pin_pad("192.168.0.20", 0);
        assert!(config.validate().is_err());

        let config = sandbox().with_pin_pad("192.168.0.20", 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_host_payload() {
        let json = r#"{
            "merchantId": "MERCHANT01",
            "onlineMerchantId": "ONLINE01",
            "secureDeviceName": "EMV_A920PRO_DATACAP_E2E",
            "operatorId": "001"
        }"#;

        let config: TerminalConfig = serde_json::from_str(json).unwrap();

        assert!(config.is_sandbox);
        assert_eq!(config.online_merchant_id.as_deref(), Some("ONLINE01"));
        assert!(config.pos_package_id.is_empty());
        assert!(config.pin_pad.is_none());
    }
}
