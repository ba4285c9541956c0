//! # JSON-Lines Outbox
//!
//! Hands outbound messages and proof requests to the external agent as one
//! JSON object per line. The agent process reading the stream owns delivery;
//! a successful write is the acknowledgement.
//!
//! ```text
//! {"kind":"message","connectionId":"c-1","messageId":"…","message":{"@type":"RetrieveFile","filename":"a.txt"}}
//! {"kind":"proof_request","connectionId":"c-1","exchangeId":"…","request":{…}}
//! ```

use async_trait::async_trait;
use request_bridge::{MessageSender, OutboundMessage, SendAck, SendError};
use serde::Serialize;
use service_registry::{ProofRequest, ProofRequester};
use shared_types::{ConnectionId, ExchangeId};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutboxLine<'a> {
    #[serde(rename_all = "camelCase")]
    Message {
        connection_id: &'a ConnectionId,
        message_id: Uuid,
        message: &'a OutboundMessage,
    },
    #[serde(rename_all = "camelCase")]
    ProofRequest {
        connection_id: &'a ConnectionId,
        exchange_id: ExchangeId,
        request: &'a ProofRequest,
    },
}

/// Line-oriented outbound transport over any async writer.
pub struct JsonLineOutbox<W> {
    writer: Mutex<W>,
}

impl<W> JsonLineOutbox<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the outbox, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_line(&self, line: &OutboxLine<'_>) -> Result<(), SendError> {
        let mut bytes =
            serde_json::to_vec(line).map_err(|e| SendError::Transport(e.to_string()))?;
        bytes.push(b'\n');

        // One line per lock so concurrent sends never interleave
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }
}

#[async_trait]
impl<W> MessageSender for JsonLineOutbox<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(
        &self,
        message: OutboundMessage,
        destination: &ConnectionId,
    ) -> Result<SendAck, SendError> {
        let ack = SendAck::new();
        self.write_line(&OutboxLine::Message {
            connection_id: destination,
            message_id: ack.message_id,
            message: &message,
        })
        .await?;
        debug!(%destination, kind = %message.kind(), message_id = %ack.message_id, "[outbox] Message written");
        Ok(ack)
    }
}

#[async_trait]
impl<W> ProofRequester for JsonLineOutbox<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn request_proof(
        &self,
        destination: &ConnectionId,
        exchange_id: ExchangeId,
        request: &ProofRequest,
    ) -> Result<(), SendError> {
        self.write_line(&OutboxLine::ProofRequest {
            connection_id: destination,
            exchange_id,
            request,
        })
        .await?;
        debug!(%destination, %exchange_id, schema = %request.schema, "[outbox] Proof request written");
        Ok(())
    }
}
