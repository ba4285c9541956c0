//! Outbound protocol messages and their reply routing.

use serde::{Deserialize, Serialize};
use shared_types::{ConnectionId, CorrelationKey, ServiceRecord, Topic, ANY_SCHEMA_KEY};
use std::fmt;
use uuid::Uuid;

/// Category of a bridged request, used for deadlines and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    File,
    Chunk,
    Stream,
    Services,
    Register,
    /// An answer to a peer's request.
    Reply,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Chunk => "chunk",
            Self::Stream => "stream",
            Self::Services => "services",
            Self::Register => "register",
            Self::Reply => "reply",
        }
    }

    /// Topic the remote answers on, if the request expects an answer.
    pub fn reply_topic(&self) -> Option<Topic> {
        match self {
            Self::File => Some(Topic::FileResult),
            Self::Chunk => Some(Topic::ChunkResult),
            Self::Stream => Some(Topic::StreamResult),
            Self::Services => Some(Topic::ServicesResult),
            Self::Register | Self::Reply => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum OutboundMessage {
    /// Ask the remote for a file by name.
    RetrieveFile { filename: String },
    /// Ask the remote for one media segment.
    FetchChunk { chunk: String },
    /// Ask the remote for its stream manifest.
    RequestStream { connection: ConnectionId },
    /// Ask the remote for its registered services, optionally by schema.
    QueryServices {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    /// Announce a service to the remote registry. No reply is expected.
    RegisterService { schema: String },
    /// Answer a peer's `QueryServices`.
    QueryServicesResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        services: Vec<ServiceRecord>,
    },
    /// Answer a peer's `RequestStream`. `name` is `ERROR` and `data` absent
    /// when the manifest could not be served.
    RequestStreamResponse {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::RetrieveFile { .. } => RequestKind::File,
            Self::FetchChunk { .. } => RequestKind::Chunk,
            Self::RequestStream { .. } => RequestKind::Stream,
            Self::QueryServices { .. } => RequestKind::Services,
            Self::RegisterService { .. } => RequestKind::Register,
            Self::QueryServicesResponse { .. } | Self::RequestStreamResponse { .. } => {
                RequestKind::Reply
            }
        }
    }

    /// Key the reply to this message will carry.
    pub fn correlation_key(&self) -> CorrelationKey {
        match self {
            Self::RetrieveFile { filename } => CorrelationKey::new(filename.as_str()),
            Self::FetchChunk { chunk } => CorrelationKey::new(chunk.as_str()),
            Self::RequestStream { connection } => CorrelationKey::new(connection.as_str()),
            Self::QueryServices { schema } | Self::QueryServicesResponse { schema, .. } => {
                CorrelationKey::new(schema.as_deref().unwrap_or(ANY_SCHEMA_KEY))
            }
            Self::RegisterService { schema } => CorrelationKey::new(schema.as_str()),
            Self::RequestStreamResponse { name, .. } => CorrelationKey::new(name.as_str()),
        }
    }

    pub fn reply_topic(&self) -> Option<Topic> {
        self.kind().reply_topic()
    }
}

/// Transport acknowledgement that a message left this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAck {
    pub message_id: Uuid,
}

impl SendAck {
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4(),
        }
    }
}

impl Default for SendAck {
    fn default() -> Self {
        Self::new()
    }
}

/// A stream manifest returned by `RequestStream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamManifest {
    pub name: String,
    pub data: Vec<u8>,
}
