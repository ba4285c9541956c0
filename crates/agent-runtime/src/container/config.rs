//! # Agent Configuration
//!
//! Unified configuration for every component of the runtime.
//!
//! All values have defaults and can be overridden from the environment; see
//! the `from_env` constructors of the component configs for variable names.

use agent_telemetry::TelemetryConfig;
use request_bridge::BridgeConfig;
use service_registry::RegistryConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    /// Logging configuration.
    pub telemetry: TelemetryConfig,
    /// Request bridge deadlines.
    pub bridge: BridgeConfig,
    /// Verification deadline, trusted issuer and publish strategy.
    pub registry: RegistryConfig,
    /// Inbound protocol handling.
    pub protocol: ProtocolConfig,
}

/// What the runtime serves to peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Manifest returned to a verified `RequestStream`.
    pub manifest_path: PathBuf,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("stream.mpd"),
        }
    }
}

impl ProtocolConfig {
    /// # Environment Variables
    ///
    /// - `AGENT_STREAM_MANIFEST` (default: `stream.mpd`)
    pub fn from_env() -> Self {
        env::var("AGENT_STREAM_MANIFEST")
            .map(|path| Self {
                manifest_path: PathBuf::from(path),
            })
            .unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A deadline would make every wait fail immediately.
    #[error("{name} must be greater than zero")]
    ZeroDeadline { name: &'static str },

    /// Without an issuer no presentation can satisfy the restrictions.
    #[error("AGENT_TRUSTED_ISSUER_DID must not be empty")]
    EmptyIssuerDid,

    #[error("AGENT_SERVICE_NAME must not be empty")]
    EmptyServiceName,

    #[error("AGENT_STREAM_MANIFEST must not be empty")]
    EmptyManifestPath,
}

impl AgentConfig {
    /// Load every component config from the environment.
    pub fn from_env() -> Self {
        Self {
            telemetry: TelemetryConfig::from_env(),
            bridge: BridgeConfig::from_env(),
            registry: RegistryConfig::from_env(),
            protocol: ProtocolConfig::from_env(),
        }
    }

    /// Reject configurations the runtime cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }

        for (name, deadline) in self.bridge.deadlines() {
            if deadline == Duration::ZERO {
                return Err(ConfigError::ZeroDeadline { name });
            }
        }
        if self.registry.verification_deadline == Duration::ZERO {
            return Err(ConfigError::ZeroDeadline {
                name: "AGENT_VERIFICATION_DEADLINE_SECS",
            });
        }

        if self.registry.trusted_issuer_did.trim().is_empty() {
            return Err(ConfigError::EmptyIssuerDid);
        }
        if self.protocol.manifest_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyManifestPath);
        }
        Ok(())
    }
}
