//! # Event Handlers
//!
//! Long-running bus observers and the inbound protocol dispatch.

pub mod metrics_sink;
pub mod protocol;

pub use metrics_sink::MetricsSink;
pub use protocol::{
    Handled, InboundEnvelope, InboundMessage, ProtocolError, ProtocolHandler, STREAM_ERROR_NAME,
};
