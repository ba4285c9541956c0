//! # Error Types
//!
//! Errors raised while validating inbound payloads at the bus boundary.

use thiserror::Error;

/// A webhook payload failed validation against its topic's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The topic string does not name a known topic.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The payload is not a JSON object.
    #[error("Payload for topic {topic} is not an object")]
    NotAnObject { topic: String },

    /// A required field is absent.
    #[error("Payload for topic {topic} is missing field '{field}'")]
    MissingField { topic: String, field: String },

    /// A field is present but has the wrong shape.
    #[error("Payload for topic {topic} has invalid field '{field}': {reason}")]
    InvalidField {
        topic: String,
        field: String,
        reason: String,
    },

    /// The payload reports an exchange that has not reached a terminal state.
    #[error("Payload for topic {topic} is not terminal (state '{state}')")]
    NotTerminal { topic: String, state: String },
}

impl PayloadError {
    /// Whether the payload was a well-formed progress report rather than a
    /// schema violation.
    pub fn is_progress(&self) -> bool {
        matches!(self, Self::NotTerminal { .. })
    }
}
