//! # Adapters
//!
//! Connect the bus and the outbound ports to the external agent process.
//!
//! - `ingress` - webhook lines in, validated events onto the bus; peer
//!   messages to the protocol handler
//! - `outbox` - messages and proof requests out, one JSON line each

pub mod ingress;
pub mod outbox;

pub use ingress::{IngressError, IngressStats, Ingested, WebhookIngress};
pub use outbox::JsonLineOutbox;
