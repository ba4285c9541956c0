//! # Outbound Ports
//!
//! The transport that carries protocol messages to remote agents.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shared_bus::InMemoryEventBus;
use shared_types::ConnectionId;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::{OutboundMessage, SendAck, SendError};

/// Message transport - outbound port.
///
/// Fire-and-forget: an `Ok` acknowledgement only means the message left
/// this agent. Replies arrive later as webhooks on the bus.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        message: OutboundMessage,
        destination: &ConnectionId,
    ) -> Result<SendAck, SendError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Builds the webhook a simulated remote agent would send back.
pub type Responder = Box<dyn Fn(&OutboundMessage) -> Option<(String, Value)> + Send + Sync>;

struct Replies {
    bus: Arc<InMemoryEventBus>,
    responder: Responder,
    delay: Option<Duration>,
}

/// Mock transport that records every message and can simulate replies.
pub struct MockSender {
    sent: Mutex<Vec<(OutboundMessage, ConnectionId)>>,
    failure: Mutex<Option<SendError>>,
    replies: Option<Replies>,
}

impl MockSender {
    /// Accept every message; never reply.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            replies: None,
        }
    }

    /// Reject every message with `error`.
    pub fn failing(error: SendError) -> Self {
        let sender = Self::new();
        sender.set_failure(Some(error));
        sender
    }

    /// Publish the responder's webhook onto `bus` before acknowledging.
    ///
    /// The reply therefore lands before the caller sees the send succeed.
    pub fn replying<F>(bus: Arc<InMemoryEventBus>, responder: F) -> Self
    where
        F: Fn(&OutboundMessage) -> Option<(String, Value)> + Send + Sync + 'static,
    {
        Self {
            replies: Some(Replies {
                bus,
                responder: Box::new(responder),
                delay: None,
            }),
            ..Self::new()
        }
    }

    /// Publish replies from a background task after `delay` instead.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        if let Some(replies) = self.replies.as_mut() {
            replies.delay = Some(delay);
        }
        self
    }

    /// Change the failure injected into subsequent sends.
    pub fn set_failure(&self, error: Option<SendError>) {
        *self.failure.lock() = error;
    }

    /// Every message sent so far, with its destination.
    pub fn sent(&self) -> Vec<(OutboundMessage, ConnectionId)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send(
        &self,
        message: OutboundMessage,
        destination: &ConnectionId,
    ) -> Result<SendAck, SendError> {
        self.sent.lock().push((message.clone(), destination.clone()));

        let failure = self.failure.lock().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let Some(replies) = &self.replies else {
            return Ok(SendAck::new());
        };
        let Some((topic, payload)) = (replies.responder)(&message) else {
            return Ok(SendAck::new());
        };

        match replies.delay {
            None => {
                if let Err(e) = replies.bus.publish_webhook(&topic, payload).await {
                    warn!(error = %e, "Mock reply rejected");
                }
            }
            Some(delay) => {
                let bus = Arc::clone(&replies.bus);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = bus.publish_webhook(&topic, payload).await {
                        warn!(error = %e, "Mock reply rejected");
                    }
                });
            }
        }
        Ok(SendAck::new())
    }
}
