//! # Outbound Request Bridge
//!
//! Turns a fire-and-forget agent message into a single awaited call.
//!
//! ## Flow
//!
//! 1. Open a [`CorrelationWaiter`] on the reply topic, keyed by the
//!    correlation key
//! 2. Dispatch the message; a send failure is returned immediately
//! 3. Wait for the reply under a deadline
//! 4. Record the round trip (histogram + `RequestMetrics` event)
//! 5. Interpret the reply: non-ok status is surfaced verbatim, ok content is
//!    base64-decoded
//!
//! The waiter is opened before dispatch: the bus does not buffer, and a
//! reply may arrive before the transport acknowledges the send.
//!
//! [`CorrelationWaiter`]: shared_bus::CorrelationWaiter

use agent_telemetry::metrics::{BRIDGE_PENDING_REQUESTS, BRIDGE_REQUESTS, BRIDGE_REQUEST_DURATION};
use async_trait::async_trait;
use shared_bus::{by_correlation_key, EventPublisher, EventSubscriber, InMemoryEventBus, TopicMatcher, WaitError};
use shared_types::{
    AgentEvent, ConnectionId, CorrelationKey, RequestMetrics, ServiceRecord, Topic,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::domain::{
    decode_event, decode_manifest, BridgeError, BridgeStats, BridgeStatsSnapshot,
    OutboundMessage, RequestKind, SendAck, StreamManifest,
};
use crate::ports::inbound::RequestBridgeApi;
use crate::ports::outbound::MessageSender;

/// Counts a request as in flight until dropped.
struct InFlight<'a> {
    pending: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn new(pending: &'a AtomicUsize) -> Self {
        pending.fetch_add(1, Ordering::Relaxed);
        BRIDGE_PENDING_REQUESTS.inc();
        Self { pending }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        BRIDGE_PENDING_REQUESTS.dec();
    }
}

/// Request bridge over the shared bus and an outbound transport.
pub struct OutboundRequestBridge {
    bus: Arc<InMemoryEventBus>,
    sender: Arc<dyn MessageSender>,
    config: BridgeConfig,
    stats: BridgeStats,
    pending: AtomicUsize,
}

impl OutboundRequestBridge {
    pub fn new(
        bus: Arc<InMemoryEventBus>,
        sender: Arc<dyn MessageSender>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            bus,
            sender,
            config,
            stats: BridgeStats::default(),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Requests dispatched and still awaiting their reply.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Send a message built around `key` and return the decoded reply content.
    ///
    /// # Errors
    ///
    /// - `BridgeError::Send` if dispatch failed (no retry)
    /// - `BridgeError::TimedOut` if no reply arrived within `deadline`
    /// - `BridgeError::Status` if the reply status is not ok (no decode attempted)
    /// - `BridgeError::Decode` if the content is not valid base64
    pub async fn request_and_wait<F>(
        &self,
        key: CorrelationKey,
        build: F,
        destination: &ConnectionId,
        deadline: Duration,
    ) -> Result<Vec<u8>, BridgeError>
    where
        F: FnOnce(&CorrelationKey) -> OutboundMessage + Send,
    {
        let message = build(&key);
        self.exchange(key, message, destination, deadline, |event| {
            decode_event(&event)
        })
        .await
    }

    /// Send `message`, wait for the correlated reply and hand it to
    /// `interpret`.
    ///
    /// Every waiting call goes through here, so each is recorded exactly
    /// once with the outcome `interpret` produced.
    pub async fn exchange<T, F>(
        &self,
        key: CorrelationKey,
        message: OutboundMessage,
        destination: &ConnectionId,
        deadline: Duration,
        interpret: F,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce(AgentEvent) -> Result<T, BridgeError> + Send,
    {
        let kind = message.kind();
        let result = match self.round_trip(key, message, destination, deadline).await {
            Ok(event) => interpret(event),
            Err(e) => Err(e),
        };
        self.record(kind, &result);
        result
    }

    /// Send `message` without waiting for anything back.
    pub async fn notify(
        &self,
        message: OutboundMessage,
        destination: &ConnectionId,
    ) -> Result<SendAck, BridgeError> {
        let kind = message.kind();
        BridgeStats::bump(&self.stats.sent);
        let result = self
            .sender
            .send(message, destination)
            .await
            .map_err(BridgeError::from);
        match &result {
            Ok(ack) => debug!(%destination, %kind, message_id = %ack.message_id, "Message sent"),
            Err(e) => warn!(%destination, %kind, error = %e, "Send failed"),
        }
        self.record(kind, &result);
        result
    }

    async fn round_trip(
        &self,
        key: CorrelationKey,
        message: OutboundMessage,
        destination: &ConnectionId,
        deadline: Duration,
    ) -> Result<AgentEvent, BridgeError> {
        let kind = message.kind();
        let topic = kind
            .reply_topic()
            .ok_or(BridgeError::NoReplyExpected { kind })?;

        let waiter = self
            .bus
            .open(TopicMatcher::exact(topic), by_correlation_key(key.clone()));
        let _in_flight = InFlight::new(&self.pending);
        let started = Instant::now();

        BridgeStats::bump(&self.stats.sent);
        if let Err(e) = self.sender.send(message, destination).await {
            warn!(correlation_key = %key, %destination, %kind, error = %e, "Send failed");
            return Err(e.into());
        }
        debug!(correlation_key = %key, %destination, %kind, "Request dispatched");

        let event = waiter.wait(deadline).await.map_err(|e| match e {
            WaitError::TimedOut { after } => {
                warn!(correlation_key = %key, %kind, ?after, "No reply before deadline");
                BridgeError::TimedOut {
                    correlation_key: key.clone(),
                    after,
                }
            }
            WaitError::Closed => BridgeError::Closed {
                correlation_key: key.clone(),
            },
        })?;

        self.observe_round_trip(kind, topic, key, started.elapsed())
            .await;
        Ok(event)
    }

    async fn observe_round_trip(
        &self,
        kind: RequestKind,
        topic: Topic,
        key: CorrelationKey,
        elapsed: Duration,
    ) {
        BRIDGE_REQUEST_DURATION
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());

        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        info!(correlation_key = %key, elapsed_ms, "BM({}): {};{}", kind, key, elapsed_ms);

        self.bus
            .publish(AgentEvent::RequestMetrics(RequestMetrics {
                correlation_key: key,
                reply_topic: topic,
                elapsed_ms,
            }))
            .await;
    }

    fn record<T>(&self, kind: RequestKind, result: &Result<T, BridgeError>) {
        let outcome = match result {
            Ok(_) => {
                BridgeStats::bump(&self.stats.completed);
                "ok"
            }
            Err(e) => {
                match e {
                    BridgeError::Send(_) => BridgeStats::bump(&self.stats.send_failures),
                    BridgeError::Status { .. } => BridgeStats::bump(&self.stats.status_failures),
                    BridgeError::Decode { .. } => BridgeStats::bump(&self.stats.decode_failures),
                    BridgeError::TimedOut { .. } => BridgeStats::bump(&self.stats.timeouts),
                    _ => {}
                }
                e.outcome()
            }
        };
        BRIDGE_REQUESTS
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
    }
}

#[async_trait]
impl RequestBridgeApi for OutboundRequestBridge {
    async fn retrieve_file(
        &self,
        destination: &ConnectionId,
        filename: &str,
    ) -> Result<Vec<u8>, BridgeError> {
        self.request_and_wait(
            CorrelationKey::new(filename),
            |key| OutboundMessage::RetrieveFile {
                filename: key.to_string(),
            },
            destination,
            self.config.file_deadline,
        )
        .await
    }

    async fn fetch_chunk(
        &self,
        destination: &ConnectionId,
        chunk: &str,
    ) -> Result<Vec<u8>, BridgeError> {
        self.request_and_wait(
            CorrelationKey::new(chunk),
            |key| OutboundMessage::FetchChunk {
                chunk: key.to_string(),
            },
            destination,
            self.config.chunk_deadline,
        )
        .await
    }

    async fn request_stream(
        &self,
        destination: &ConnectionId,
    ) -> Result<StreamManifest, BridgeError> {
        let message = OutboundMessage::RequestStream {
            connection: destination.clone(),
        };
        let key = message.correlation_key();
        self.exchange(key, message, destination, self.config.stream_deadline, |event| {
            decode_manifest(&event)
        })
        .await
    }

    async fn query_services(
        &self,
        destination: &ConnectionId,
        schema: Option<&str>,
    ) -> Result<Vec<ServiceRecord>, BridgeError> {
        let message = OutboundMessage::QueryServices {
            schema: schema.map(str::to_string),
        };
        let key = message.correlation_key();
        self.exchange(key, message, destination, self.config.query_deadline, |event| {
            match event {
                AgentEvent::ServicesResult(payload) => Ok(payload.services),
                other => Err(BridgeError::UnexpectedReply {
                    topic: other.topic(),
                }),
            }
        })
        .await
    }

    async fn register_service(
        &self,
        destination: &ConnectionId,
        schema: &str,
    ) -> Result<SendAck, BridgeError> {
        let message = OutboundMessage::RegisterService {
            schema: schema.to_string(),
        };
        self.notify(message, destination).await
    }

    async fn reply(
        &self,
        destination: &ConnectionId,
        message: OutboundMessage,
    ) -> Result<SendAck, BridgeError> {
        self.notify(message, destination).await
    }

    fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }
}
