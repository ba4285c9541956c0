//! Domain layer for the request bridge.

pub mod decode;
pub mod errors;
pub mod message;
pub mod stats;

pub use decode::{decode_event, decode_manifest, decode_reply};
pub use errors::{BridgeError, SendError};
pub use message::{OutboundMessage, RequestKind, SendAck, StreamManifest};
pub use stats::{BridgeStats, BridgeStatsSnapshot};
