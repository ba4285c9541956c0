//! Inbound ports (API) for the request bridge.

use async_trait::async_trait;
use shared_types::{ConnectionId, ServiceRecord};

use crate::domain::{BridgeError, BridgeStatsSnapshot, OutboundMessage, SendAck, StreamManifest};

/// Typed request/reply operations offered to handlers and flows.
///
/// Every call that waits does so under the configured per-kind deadline.
#[async_trait]
pub trait RequestBridgeApi: Send + Sync {
    /// Retrieve a file from the agent behind `destination`.
    async fn retrieve_file(
        &self,
        destination: &ConnectionId,
        filename: &str,
    ) -> Result<Vec<u8>, BridgeError>;

    /// Fetch one media segment.
    async fn fetch_chunk(
        &self,
        destination: &ConnectionId,
        chunk: &str,
    ) -> Result<Vec<u8>, BridgeError>;

    /// Request the remote stream manifest.
    async fn request_stream(
        &self,
        destination: &ConnectionId,
    ) -> Result<StreamManifest, BridgeError>;

    /// Query the remote service registry.
    async fn query_services(
        &self,
        destination: &ConnectionId,
        schema: Option<&str>,
    ) -> Result<Vec<ServiceRecord>, BridgeError>;

    /// Announce a service to the remote registry without waiting for a reply.
    async fn register_service(
        &self,
        destination: &ConnectionId,
        schema: &str,
    ) -> Result<SendAck, BridgeError>;

    /// Answer a peer's request. Replies expect nothing back.
    async fn reply(
        &self,
        destination: &ConnectionId,
        message: OutboundMessage,
    ) -> Result<SendAck, BridgeError>;

        /// Current request statistics.
    fn stats(&self) -> BridgeStatsSnapshot;
}
