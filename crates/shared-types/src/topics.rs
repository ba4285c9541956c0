//! # Topics
//!
//! Named channels on the event bus. Each topic has one canonical wire string;
//! the legacy webhook spellings emitted by the agent runtime are accepted as
//! aliases when parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::PayloadError;

/// Prefix the agent runtime puts in front of webhook topics.
pub const WEBHOOK_TOPIC_PREFIX: &str = "acapy::webhook::";

/// Event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Reply to a RetrieveFile request.
    FileResult,
    /// Reply to a FetchChunk request.
    ChunkResult,
    /// Reply to a RequestStream request.
    StreamResult,
    /// Reply to a QueryServices request.
    ServicesResult,
    /// A proof-presentation exchange finished on the verifier side.
    ///
    /// The runtime's `present_proof_v2_0` spelling reports every state change;
    /// only `done` and `abandoned` validate as events of this topic.
    PresentationDone,
    /// A service record was created or updated.
    ServiceRecord,
    /// A supervised verification sub-flow terminated with an error.
    SubflowFailed,
    /// Round-trip timing for a bridged request.
    RequestMetrics,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Topic; 8] = [
        Topic::FileResult,
        Topic::ChunkResult,
        Topic::StreamResult,
        Topic::ServicesResult,
        Topic::PresentationDone,
        Topic::ServiceRecord,
        Topic::SubflowFailed,
        Topic::RequestMetrics,
    ];

    /// Canonical wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileResult => "file_result",
            Self::ChunkResult => "chunk_result",
            Self::StreamResult => "stream_result",
            Self::ServicesResult => "services_result",
            Self::PresentationDone => "present_proof_done",
            Self::ServiceRecord => "registered_service",
            Self::SubflowFailed => "subflow_failed",
            Self::RequestMetrics => "request_metrics",
        }
    }

    /// Whether this topic carries a correlated reply (status + content).
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::FileResult | Self::ChunkResult | Self::StreamResult)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(WEBHOOK_TOPIC_PREFIX).unwrap_or(s);
        // Webhook paths use dashes where topics use underscores
        let name = name.replace('-', "_");

        let topic = match name.as_str() {
            "file_result" | "retrievefile_result" => Self::FileResult,
            "chunk_result" | "fetchchunk_result" => Self::ChunkResult,
            "stream_result" | "requeststream_result" => Self::StreamResult,
            "services_result" | "queryservices_result" => Self::ServicesResult,
            "present_proof_done" | "present_proof_v2_0" => Self::PresentationDone,
            "registered_service" => Self::ServiceRecord,
            "subflow_failed" => Self::SubflowFailed,
            "request_metrics" | "retrievefile_metrics" => Self::RequestMetrics,
            _ => return Err(PayloadError::UnknownTopic(s.to_string())),
        };
        Ok(topic)
    }
}
