//! # Inbound Protocol Handler
//!
//! Serves the requests peers send to this agent. The external agent forwards
//! each one as an ingress line:
//!
//! ```text
//! {"connectionId":"c-1","senderDid":"did:sov:peer","message":{"@type":"RegisterService","schema":"car-sharing"}}
//! ```
//!
//! - `RegisterService`: create a record owned by the sender and start its
//!   credential verification
//! - `QueryServices`: answer from the record store
//! - `RequestStream`: verify the holder's identity, then send the manifest
//!
//! Replies leave through the request bridge and expect nothing back.

use agent_telemetry::metrics::PROTOCOL_MESSAGES;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use request_bridge::{BridgeError, OutboundMessage, OutboundRequestBridge, RequestBridgeApi, SendAck};
use serde::Deserialize;
use service_registry::{AttributeGroup, Registration, RegistryError, VerificationOrchestrator};
use shared_types::ConnectionId;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::container::ProtocolConfig;

/// Manifest name sent when the stream cannot be served.
pub const STREAM_ERROR_NAME: &str = "ERROR";

/// A request from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "@type")]
pub enum InboundMessage {
    RegisterService {
        schema: String,
    },
    QueryServices {
        #[serde(default)]
        schema: Option<String>,
    },
    RequestStream {
        #[serde(default)]
        connection: Option<ConnectionId>,
    },
}

impl InboundMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RegisterService { .. } => "RegisterService",
            Self::QueryServices { .. } => "QueryServices",
            Self::RequestStream { .. } => "RequestStream",
        }
    }
}

/// An inbound message with the connection it arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub connection_id: ConnectionId,
    #[serde(default)]
    pub sender_did: Option<String>,
    pub message: InboundMessage,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Registration needs an owner.
    #[error("RegisterService on {connection_id} carries no sender DID")]
    MissingSender { connection_id: ConnectionId },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Reply failed: {0}")]
    Reply(#[from] BridgeError),
}

/// Result of handling one inbound message.
pub enum Handled {
    /// Verification runs on; join the registration to wait for it.
    Registered(Registration),
    Replied(SendAck),
}

/// Dispatches inbound peer messages to the registry and the bridge.
pub struct ProtocolHandler {
    bridge: Arc<OutboundRequestBridge>,
    registry: Arc<VerificationOrchestrator>,
    config: ProtocolConfig,
}

impl ProtocolHandler {
    pub fn new(
        bridge: Arc<OutboundRequestBridge>,
        registry: Arc<VerificationOrchestrator>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            bridge,
            registry,
            config,
        }
    }

    /// Handle one inbound message to completion.
    ///
    /// `RequestStream` waits for the holder's presentation, so this can take
    /// up to the verification deadline.
    pub async fn handle(&self, envelope: InboundEnvelope) -> Result<Handled, ProtocolError> {
        let InboundEnvelope {
            connection_id,
            sender_did,
            message,
        } = envelope;
        let type_name = message.type_name();
        debug!(%connection_id, sender = ?sender_did, message_type = type_name, "[protocol] Inbound message");

        let result = match message {
            InboundMessage::RegisterService { schema } => {
                self.register(&connection_id, sender_did, &schema).await
            }
            InboundMessage::QueryServices { schema } => {
                self.query(&connection_id, schema).await
            }
            InboundMessage::RequestStream { .. } => self.serve_stream(&connection_id).await,
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => {
                warn!(%connection_id, message_type = type_name, error = %e, "[protocol] Inbound message failed");
                "error"
            }
        };
        PROTOCOL_MESSAGES
            .with_label_values(&[type_name, outcome])
            .inc();
        result
    }

    async fn register(
        &self,
        connection_id: &ConnectionId,
        sender_did: Option<String>,
        schema: &str,
    ) -> Result<Handled, ProtocolError> {
        let owner = sender_did.ok_or_else(|| ProtocolError::MissingSender {
            connection_id: connection_id.clone(),
        })?;
        let registration = self.registry.register(connection_id, &owner, schema).await?;
        info!(
            record_id = %registration.record_id(),
            %owner,
            schema,
            "[protocol] Peer registered a service"
        );
        Ok(Handled::Registered(registration))
    }

    async fn query(
        &self,
        connection_id: &ConnectionId,
        schema: Option<String>,
    ) -> Result<Handled, ProtocolError> {
        let services = self.registry.list_services(schema.as_deref()).await?;
        debug!(%connection_id, schema = ?schema, found = services.len(), "[protocol] Answering service query");
        let ack = self
            .bridge
            .reply(
                connection_id,
                OutboundMessage::QueryServicesResponse { schema, services },
            )
            .await?;
        Ok(Handled::Replied(ack))
    }

    /// The manifest goes out only after the holder proved their identity.
    async fn serve_stream(&self, connection_id: &ConnectionId) -> Result<Handled, ProtocolError> {
        let group = AttributeGroup::identity(&self.registry.config().trusted_issuer_did);
        let reply = match self.registry.verify_holder(connection_id, group).await {
            Ok(holder) => {
                info!(%connection_id, %holder, "[protocol] Holder verified, serving stream");
                self.manifest_reply().await
            }
            Err(_) => stream_error(),
        };
        let ack = self.bridge.reply(connection_id, reply).await?;
        Ok(Handled::Replied(ack))
    }

    async fn manifest_reply(&self) -> OutboundMessage {
        let path = &self.config.manifest_path;
        match tokio::fs::read(path).await {
            Ok(bytes) => OutboundMessage::RequestStreamResponse {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
                data: Some(STANDARD.encode(bytes)),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[protocol] Manifest unreadable");
                stream_error()
            }
        }
    }
}

fn stream_error() -> OutboundMessage {
    OutboundMessage::RequestStreamResponse {
        name: STREAM_ERROR_NAME.to_string(),
        data: None,
    }
}
