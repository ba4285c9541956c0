//! # Domain Errors
//!
//! Error types for the request bridge.

use crate::domain::message::RequestKind;
use shared_types::{ConnectionId, CorrelationKey, ReplyStatus, Topic};
use std::time::Duration;
use thiserror::Error;

/// The transport could not dispatch a message. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// No usable connection to the destination.
    #[error("Destination unreachable: {0}")]
    Unreachable(ConnectionId),

    /// The transport accepted the call but failed to deliver.
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Errors surfaced by a bridged request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Dispatch failed before any reply could be awaited.
    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    /// The reply content was not valid transport encoding.
    #[error("Invalid base64 content for {correlation_key}: {reason}")]
    Decode {
        correlation_key: CorrelationKey,
        reason: String,
    },

    /// The remote answered with a non-ok status, passed through verbatim.
    #[error("Remote returned status '{status}' for {correlation_key}")]
    Status {
        status: ReplyStatus,
        correlation_key: CorrelationKey,
    },

    /// No reply arrived before the deadline.
    #[error("No reply for {correlation_key} within {after:?}")]
    TimedOut {
        correlation_key: CorrelationKey,
        after: Duration,
    },

    /// The bus closed the wait before a reply arrived.
    #[error("Wait for {correlation_key} closed before a reply arrived")]
    Closed { correlation_key: CorrelationKey },

    /// An ok reply carried no content.
    #[error("Reply for {correlation_key} has no content")]
    MissingContent { correlation_key: CorrelationKey },

    /// The request kind has no reply topic.
    #[error("{kind} requests have no reply to wait for")]
    NoReplyExpected { kind: RequestKind },

    /// A reply arrived on a topic the caller cannot interpret.
    #[error("Unexpected reply on topic {topic}")]
    UnexpectedReply { topic: Topic },
}

impl BridgeError {
    /// HTTP-equivalent status for handlers that surface this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Decode { .. } => 400,
            Self::Status { status, .. } => match status.as_str() {
                ReplyStatus::NOT_FOUND => 404,
                other => other
                    .parse::<u16>()
                    .ok()
                    .filter(|code| (100..=599).contains(code))
                    .unwrap_or(502),
            },
            Self::TimedOut { .. } => 504,
            Self::Closed { .. } => 503,
            Self::NoReplyExpected { .. } => 500,
            Self::Send(_) | Self::MissingContent { .. } | Self::UnexpectedReply { .. } => 502,
        }
    }

    /// Short label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Send(_) => "send_error",
            Self::Decode { .. } => "decode_error",
            Self::Status { .. } => "status_error",
            Self::TimedOut { .. } => "timeout",
            Self::Closed { .. } => "closed",
            Self::MissingContent { .. } => "missing_content",
            Self::NoReplyExpected { .. } => "no_reply",
            Self::UnexpectedReply { .. } => "unexpected_reply",
        }
    }
}
