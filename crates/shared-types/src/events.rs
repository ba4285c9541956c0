//! # Agent Events
//!
//! Every event that flows through the bus, one variant per [`Topic`].
//!
//! Inbound webhooks arrive as `(topic, JSON object)` pairs from the agent
//! runtime. [`AgentEvent::from_webhook`] validates them against the topic's
//! payload schema so that waiter predicates only ever see well-formed events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::PayloadError;
use crate::ids::{ConnectionId, CorrelationKey, ExchangeId, RecordId};
use crate::payload::Fields;
use crate::record::ServiceRecord;
use crate::topics::Topic;

/// Correlation key used for a services query without a schema filter.
pub const ANY_SCHEMA_KEY: &str = "*";

/// Domain status carried by a reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyStatus(String);

impl ReplyStatus {
    pub const OK: &'static str = "ok";
    pub const NOT_FOUND: &'static str = "not_found";
    pub const ERROR: &'static str = "error";

    pub fn ok() -> Self {
        Self(Self::OK.to_string())
    }

    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// Map a numeric (HTTP-style) status onto the string form.
    pub fn from_code(code: i64) -> Self {
        match code {
            200 => Self::ok(),
            404 => Self(Self::NOT_FOUND.to_string()),
            other => Self(other.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.0 == Self::OK
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reply to a correlated request (file, chunk or stream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPayload {
    pub correlation_key: CorrelationKey,
    pub status: ReplyStatus,
    /// Transport-encoded (base64) content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    /// Resource name reported by the remote (e.g. a stream manifest name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ReplyPayload {
    pub fn ok(key: impl Into<CorrelationKey>, content: impl Into<String>) -> Self {
        Self {
            correlation_key: key.into(),
            status: ReplyStatus::ok(),
            content: Some(content.into()),
            connection_id: None,
            name: None,
        }
    }

    pub fn failed(key: impl Into<CorrelationKey>, status: ReplyStatus) -> Self {
        Self {
            correlation_key: key.into(),
            status,
            content: None,
            connection_id: None,
            name: None,
        }
    }
}

/// Reply to a services query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

impl ServicesPayload {
    /// Key a services reply is correlated on: the schema filter, or `*`.
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.schema.as_deref().unwrap_or(ANY_SCHEMA_KEY))
    }
}

/// Terminal state of a presentation exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationState {
    #[default]
    Done,
    /// The exchange was given up by either side; nothing was presented.
    Abandoned,
}

impl PresentationState {
    pub const DONE: &'static str = "done";
    pub const ABANDONED: &'static str = "abandoned";
}

/// Completion of a proof-presentation exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationPayload {
    pub exchange_id: ExchangeId,
    #[serde(default)]
    pub state: PresentationState,
    /// Absent on the wire means not verified.
    #[serde(default)]
    pub verified: bool,
    /// Requested-attribute referent to disclosed raw value.
    #[serde(default)]
    pub revealed_attributes: BTreeMap<String, String>,
}

/// Terminal failure of a supervised verification sub-flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubflowFailure {
    pub record_id: RecordId,
    pub schema: String,
    pub error: String,
}

/// Round-trip timing of one bridged request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetrics {
    pub correlation_key: CorrelationKey,
    pub reply_topic: Topic,
    pub elapsed_ms: u64,
}

/// All events that can be published to the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "snake_case")]
pub enum AgentEvent {
    FileResult(ReplyPayload),
    ChunkResult(ReplyPayload),
    StreamResult(ReplyPayload),
    ServicesResult(ServicesPayload),
    PresentationDone(PresentationPayload),
    ServiceRecord(ServiceRecord),
    SubflowFailed(SubflowFailure),
    RequestMetrics(RequestMetrics),
}

impl AgentEvent {
    /// Topic this event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            Self::FileResult(_) => Topic::FileResult,
            Self::ChunkResult(_) => Topic::ChunkResult,
            Self::StreamResult(_) => Topic::StreamResult,
            Self::ServicesResult(_) => Topic::ServicesResult,
            Self::PresentationDone(_) => Topic::PresentationDone,
            Self::ServiceRecord(_) => Topic::ServiceRecord,
            Self::SubflowFailed(_) => Topic::SubflowFailed,
            Self::RequestMetrics(_) => Topic::RequestMetrics,
        }
    }

    /// Reply payload, for the correlated reply topics.
    pub fn reply(&self) -> Option<&ReplyPayload> {
        match self {
            Self::FileResult(r) | Self::ChunkResult(r) | Self::StreamResult(r) => Some(r),
            _ => None,
        }
    }

    /// Key this event answers, if it is an answer to something.
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        match self {
            Self::FileResult(r) | Self::ChunkResult(r) | Self::StreamResult(r) => {
                Some(r.correlation_key.clone())
            }
            Self::ServicesResult(s) => Some(s.correlation_key()),
            Self::PresentationDone(p) => Some(CorrelationKey::new(p.exchange_id.to_string())),
            _ => None,
        }
    }

    /// Exchange id, for presentation completions.
    pub fn exchange_id(&self) -> Option<ExchangeId> {
        match self {
            Self::PresentationDone(p) => Some(p.exchange_id),
            _ => None,
        }
    }

    /// Validate a raw webhook against its topic's schema.
    ///
    /// # Errors
    ///
    /// - `PayloadError::UnknownTopic` if `topic` names no known topic
    /// - `PayloadError::NotAnObject` if `payload` is not a JSON object
    /// - `PayloadError::MissingField` / `InvalidField` on schema violations
    pub fn from_webhook(topic: &str, payload: Value) -> Result<Self, PayloadError> {
        let topic: Topic = topic.parse()?;
        match topic {
            Topic::FileResult => parse_reply(topic, &payload, &["filename"]).map(Self::FileResult),
            Topic::ChunkResult => parse_reply(topic, &payload, &["chunk"]).map(Self::ChunkResult),
            Topic::StreamResult => parse_stream(&payload).map(Self::StreamResult),
            Topic::ServicesResult => parse_services(&payload).map(Self::ServicesResult),
            Topic::PresentationDone => parse_presentation(&payload).map(Self::PresentationDone),
            Topic::ServiceRecord => parse_record(&payload).map(Self::ServiceRecord),
            Topic::SubflowFailed => from_value(topic, payload).map(Self::SubflowFailed),
            Topic::RequestMetrics => from_value(topic, payload).map(Self::RequestMetrics),
        }
    }
}

fn parse_status(fields: &Fields<'_>) -> Result<Option<ReplyStatus>, PayloadError> {
    match fields.get(&["status"]) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(ReplyStatus::new(s.clone()))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|code| Some(ReplyStatus::from_code(code)))
            .ok_or_else(|| fields.invalid("status", "expected an integer status code")),
        Some(_) => Err(fields.invalid("status", "expected a string or integer")),
    }
}

fn parse_reply(
    topic: Topic,
    payload: &Value,
    key_aliases: &[&str],
) -> Result<ReplyPayload, PayloadError> {
    let fields = Fields::new(topic, payload)?;

    let mut key_names = vec!["correlationKey"];
    key_names.extend_from_slice(key_aliases);

    Ok(ReplyPayload {
        correlation_key: CorrelationKey::new(fields.required_str(&key_names)?),
        status: parse_status(&fields)?.ok_or_else(|| fields.missing("status"))?,
        content: fields.opt_str(&["content", "data"])?,
        connection_id: fields
            .opt_str(&["connectionId", "conn_id"])?
            .map(ConnectionId::new),
        name: fields.opt_str(&["name"])?,
    })
}

/// Stream replies carry no status; a missing manifest or the `ERROR` name
/// means the remote failed.
fn parse_stream(payload: &Value) -> Result<ReplyPayload, PayloadError> {
    let fields = Fields::new(Topic::StreamResult, payload)?;

    let connection = fields.opt_str(&["connectionId", "conn_id"])?;
    let key = match fields.opt_str(&["correlationKey"])? {
        Some(key) => key,
        None => connection.clone().ok_or_else(|| fields.missing("correlationKey"))?,
    };
    let content = fields.opt_str(&["content", "data"])?;
    let name = fields.opt_str(&["name"])?;

    let status = match parse_status(&fields)? {
        Some(status) => status,
        None if content.is_none() || name.as_deref() == Some("ERROR") => {
            ReplyStatus::new(ReplyStatus::ERROR)
        }
        None => ReplyStatus::ok(),
    };

    Ok(ReplyPayload {
        correlation_key: CorrelationKey::new(key),
        status,
        content,
        connection_id: connection.map(ConnectionId::new),
        name,
    })
}

fn parse_services(payload: &Value) -> Result<ServicesPayload, PayloadError> {
    let topic = Topic::ServicesResult;
    let fields = Fields::new(topic, payload)?;

    let schema = fields.opt_str(&["schema"])?;
    let services = match fields.get(&["services"]) {
        None => Vec::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| fields.invalid("services", e.to_string()))?,
    };

    Ok(ServicesPayload { schema, services })
}

fn parse_presentation(payload: &Value) -> Result<PresentationPayload, PayloadError> {
    let fields = Fields::new(Topic::PresentationDone, payload)?;

    let raw_id = fields.required_str(&["exchangeId", "pres_ex_id"])?;
    let exchange_id = ExchangeId::parse(&raw_id)
        .map_err(|e| fields.invalid("exchangeId", e.to_string()))?;

    // The runtime reports every state change of the exchange on one topic
    let state = match fields.opt_str(&["state"])?.as_deref() {
        None | Some(PresentationState::DONE) => PresentationState::Done,
        Some(PresentationState::ABANDONED) => PresentationState::Abandoned,
        Some(other) => {
            return Err(PayloadError::NotTerminal {
                topic: Topic::PresentationDone.to_string(),
                state: other.to_string(),
            })
        }
    };
    let verified = state == PresentationState::Done
        && fields.opt_bool(&["verified"])?.unwrap_or(false);

    let mut revealed_attributes = BTreeMap::new();
    if let Some(flat) = fields.get(&["revealedAttributes"]) {
        let flat = flat
            .as_object()
            .ok_or_else(|| fields.invalid("revealedAttributes", "expected an object"))?;
        for (referent, value) in flat {
            let raw = value.as_str().ok_or_else(|| {
                fields.invalid("revealedAttributes", format!("'{referent}' is not a string"))
            })?;
            revealed_attributes.insert(referent.clone(), raw.to_string());
        }
    } else if let Some(nested) = payload.pointer("/by_format/pres/indy/requested_proof/revealed_attrs") {
        let nested = nested
            .as_object()
            .ok_or_else(|| fields.invalid("revealed_attrs", "expected an object"))?;
        for (referent, attr) in nested {
            let raw = attr.get("raw").and_then(Value::as_str).ok_or_else(|| {
                fields.invalid("revealed_attrs", format!("'{referent}' has no raw value"))
            })?;
            revealed_attributes.insert(referent.clone(), raw.to_string());
        }
    }

    Ok(PresentationPayload {
        exchange_id,
        state,
        verified,
        revealed_attributes,
    })
}

/// Accepts either a bare record or `{"record": {...}}`.
fn parse_record(payload: &Value) -> Result<ServiceRecord, PayloadError> {
    let topic = Topic::ServiceRecord;
    let fields = Fields::new(topic, payload)?;
    let inner = fields.get(&["record"]).cloned().unwrap_or_else(|| payload.clone());
    from_value(topic, inner)
}

fn from_value<T: serde::de::DeserializeOwned>(topic: Topic, payload: Value) -> Result<T, PayloadError> {
    Fields::new(topic, &payload)?;
    serde_json::from_value(payload).map_err(|e| PayloadError::InvalidField {
        topic: topic.to_string(),
        field: "payload".to_string(),
        reason: e.to_string(),
    })
}
