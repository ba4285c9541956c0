//! Reply interpretation: status check, then transport decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use shared_types::{AgentEvent, ReplyPayload};

use crate::domain::errors::BridgeError;
use crate::domain::message::StreamManifest;

/// Decode an ok reply's base64 content into raw bytes.
///
/// A non-ok status is surfaced verbatim and no decode is attempted.
pub fn decode_reply(reply: &ReplyPayload) -> Result<Vec<u8>, BridgeError> {
    if !reply.status.is_ok() {
        return Err(BridgeError::Status {
            status: reply.status.clone(),
            correlation_key: reply.correlation_key.clone(),
        });
    }

    let content = reply
        .content
        .as_deref()
        .ok_or_else(|| BridgeError::MissingContent {
            correlation_key: reply.correlation_key.clone(),
        })?;

    STANDARD
        .decode(content.trim())
        .map_err(|e| BridgeError::Decode {
            correlation_key: reply.correlation_key.clone(),
            reason: e.to_string(),
        })
}

/// Decode the reply carried by a resolved event.
pub fn decode_event(event: &AgentEvent) -> Result<Vec<u8>, BridgeError> {
    let reply = event.reply().ok_or(BridgeError::UnexpectedReply {
        topic: event.topic(),
    })?;
    decode_reply(reply)
}

/// Decode a stream reply into its manifest.
pub fn decode_manifest(event: &AgentEvent) -> Result<StreamManifest, BridgeError> {
    let data = decode_event(event)?;
    let name = event
        .reply()
        .and_then(|r| r.name.clone())
        .unwrap_or_default();
    Ok(StreamManifest { name, data })
}
