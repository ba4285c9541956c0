//! # Domain Errors
//!
//! Error types for the service registry.

use request_bridge::SendError;
use shared_types::{ExchangeId, RecordId, Topic};
use std::time::Duration;
use thiserror::Error;

use crate::domain::subflow::SubflowState;

/// Record store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Registry operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A sub-flow was moved along an edge its state machine does not have.
    #[error("Invalid sub-flow transition: {from} -> {to}")]
    InvalidTransition { from: SubflowState, to: SubflowState },

    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("Registration requires at least one attribute group")]
    NoAttributeGroups,
}

/// Why a verification sub-flow ended in `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubflowError {
    #[error("Proof request failed: {0}")]
    Send(#[from] SendError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("No presentation within {after:?}")]
    TimedOut { after: Duration },

    #[error("Verification wait closed before a presentation arrived")]
    Closed,

    #[error("Presentation exchange {exchange_id} was abandoned")]
    Abandoned { exchange_id: ExchangeId },

    #[error("Presentation {exchange_id} was not verified")]
    NotVerified { exchange_id: ExchangeId },

    #[error("Presentation {exchange_id} does not reveal '{referent}'")]
    MissingAttribute {
        exchange_id: ExchangeId,
        referent: String,
    },

    #[error("Unexpected event on topic {topic}")]
    UnexpectedEvent { topic: Topic },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The sub-flow task panicked or was aborted.
    #[error("Sub-flow aborted: {0}")]
    Aborted(String),
}

impl SubflowError {
    /// Short label for logs and metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Send(_) => "send",
            Self::Persistence(_) => "persistence",
            Self::TimedOut { .. } => "timeout",
            Self::Closed => "closed",
            Self::Abandoned { .. } => "abandoned",
            Self::NotVerified { .. } => "not_verified",
            Self::MissingAttribute { .. } => "missing_attribute",
            Self::UnexpectedEvent { .. } => "unexpected_event",
            Self::Registry(_) => "registry",
            Self::Aborted(_) => "aborted",
        }
    }
}
