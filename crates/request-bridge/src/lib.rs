//! # request-bridge
//!
//! Correlated request/reply on top of fire-and-forget agent messaging.
//!
//! ## Role in System
//!
//! - **Caller side**: handlers ask for a file, a media segment, a stream
//!   manifest or the remote service list, and get one typed result back
//! - **Bus subscriber**: replies arrive as webhooks on the shared bus and are
//!   matched to the waiting call by correlation key
//!
//! ## Request Flow
//!
//! ```text
//! [Handler] ──retrieve_file──→ [OutboundRequestBridge]
//!                                   │ 1. open waiter (file_result, key)
//!                                   │ 2. MessageSender::send
//!                                   ↓
//!                             [Remote agent]
//!                                   │
//!                         webhook: file_result
//!                                   ↓
//!                              [Event Bus] ──→ waiter resolves
//!                                   │
//!                     3. status check, base64 decode
//!                                   ↓
//!                             Vec<u8> / BridgeError
//! ```
//!
//! ## Guarantees
//!
//! - Every wait has a deadline; there is no unbounded wait
//! - The waiter is released on every exit path: reply, timeout, send
//!   failure or caller cancellation
//! - A non-ok reply status is returned verbatim without attempting a decode

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::BridgeConfig;
pub use domain::{
    decode_event, decode_manifest, decode_reply, BridgeError, BridgeStats, BridgeStatsSnapshot,
    OutboundMessage, RequestKind, SendAck, SendError, StreamManifest,
};
pub use ports::{MessageSender, MockSender, RequestBridgeApi, Responder};
pub use service::OutboundRequestBridge;
