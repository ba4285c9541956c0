//! Ports for the request bridge.

pub mod inbound;
pub mod outbound;

pub use inbound::RequestBridgeApi;
pub use outbound::{MessageSender, MockSender, Responder};
