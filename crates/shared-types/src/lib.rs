//! # Shared Types Crate
//!
//! Domain types shared across the agent protocol bridge: identifiers, bus
//! topics, event payloads and the service record.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every event that crosses the bus is an
//!   [`AgentEvent`] defined here.
//! - **Validate at the Boundary**: raw webhooks become events only through
//!   [`AgentEvent::from_webhook`]; subscribers never see unvalidated JSON.

pub mod errors;
pub mod events;
pub mod ids;
mod payload;
pub mod record;
pub mod topics;

pub use errors::PayloadError;
pub use events::{
    AgentEvent, PresentationPayload, PresentationState, ReplyPayload, ReplyStatus, RequestMetrics,
    ServicesPayload, SubflowFailure, ANY_SCHEMA_KEY,
};
pub use ids::{ConnectionId, CorrelationKey, ExchangeId, RecordId};
pub use record::{RecordState, ServiceRecord};
pub use topics::{Topic, WEBHOOK_TOPIC_PREFIX};
