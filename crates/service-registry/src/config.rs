//! # Registry Configuration

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::domain::{AttributeGroup, DEFAULT_TRUSTED_ISSUER};

/// When verified attributes become visible on the service record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PublishStrategy {
    /// Each sub-flow persists and announces its own update on completion.
    #[default]
    Incremental,
    /// The initiator joins every sub-flow, then persists and announces once.
    JoinAll,
}

impl PublishStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::JoinAll => "join_all",
        }
    }
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown publish strategy '{0}' (expected 'incremental' or 'join_all')")]
pub struct ParseStrategyError(pub String);

impl FromStr for PublishStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "incremental" => Ok(Self::Incremental),
            "join_all" | "joinall" => Ok(Self::JoinAll),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

/// Service registry configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// How long a sub-flow waits for its presentation.
    pub verification_deadline: Duration,
    /// Issuer DID that requested attributes are restricted to.
    pub trusted_issuer_did: String,
    pub strategy: PublishStrategy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            verification_deadline: Duration::from_secs(300),
            trusted_issuer_did: DEFAULT_TRUSTED_ISSUER.to_string(),
            strategy: PublishStrategy::default(),
        }
    }
}

impl RegistryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `AGENT_VERIFICATION_DEADLINE_SECS` (default: 300)
    /// - `AGENT_TRUSTED_ISSUER_DID` (default: `NB5Rjw6kpkMcwmcUQeLhKt`)
    /// - `AGENT_PUBLISH_STRATEGY` (`incremental` | `join_all`, default: incremental)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let verification_deadline = env::var("AGENT_VERIFICATION_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.verification_deadline);

        let trusted_issuer_did =
            env::var("AGENT_TRUSTED_ISSUER_DID").unwrap_or(defaults.trusted_issuer_did);

        let strategy = match env::var("AGENT_PUBLISH_STRATEGY") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: ParseStrategyError| {
                warn!(error = %e, "Falling back to default publish strategy");
                defaults.strategy
            }),
            Err(_) => defaults.strategy,
        };

        Self {
            verification_deadline,
            trusted_issuer_did,
            strategy,
        }
    }

    /// Create a config for testing (short deadline).
    pub fn for_testing() -> Self {
        Self {
            verification_deadline: Duration::from_millis(500),
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: PublishStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Credential groups every registration is verified against.
    pub fn attribute_groups(&self) -> Vec<AttributeGroup> {
        vec![
            AttributeGroup::car_registration(&self.trusted_issuer_did),
            AttributeGroup::car_type(&self.trusted_issuer_did),
        ]
    }
}
