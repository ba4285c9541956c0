//! # Webhook Ingress
//!
//! Reads lines forwarded by the external agent, one JSON object per line.
//! A webhook is published onto the bus:
//!
//! ```text
//! {"topic":"acapy::webhook::file_result","payload":{"correlationKey":"a.txt","status":"ok","content":"aGVsbG8="}}
//! ```
//!
//! A message from a peer goes to the protocol handler, on its own task:
//!
//! ```text
//! {"connectionId":"c-1","senderDid":"did:sov:peer","message":{"@type":"QueryServices"}}
//! ```
//!
//! Lines that are not JSON, or whose payload fails validation for its topic,
//! are counted and logged; they never reach a subscriber. Progress webhooks
//! of an unfinished proof exchange are skipped without counting as rejected.

use agent_telemetry::metrics::BUS_WEBHOOKS_REJECTED;
use serde::Deserialize;
use serde_json::Value;
use shared_bus::InMemoryEventBus;
use shared_types::PayloadError;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::handlers::{InboundEnvelope, ProtocolHandler};

#[derive(Debug, Deserialize)]
struct WebhookLine {
    topic: String,
    #[serde(default)]
    payload: Value,
}

/// Webhooks carry a `topic`; anything else must be a peer message.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngressLine {
    Webhook(WebhookLine),
    Inbound(InboundEnvelope),
}

/// Why an ingress line was dropped.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Malformed ingress line: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Rejected(#[from] PayloadError),

    #[error("No protocol handler for inbound {0}")]
    Unroutable(&'static str),
}

/// What became of an accepted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Published; carries the number of waiters resolved.
    Published(usize),
    /// A proof exchange reported progress short of completion.
    Skipped,
    /// Handed to the protocol handler.
    Dispatched,
}

/// Counters for one ingress run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub accepted: u64,
    pub skipped: u64,
    pub dispatched: u64,
    pub rejected: u64,
}

/// Publishes forwarded webhooks onto the bus and dispatches peer messages.
pub struct WebhookIngress {
    bus: Arc<InMemoryEventBus>,
    protocol: Option<Arc<ProtocolHandler>>,
}

impl WebhookIngress {
    /// Webhooks only; peer messages are rejected as unroutable.
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            bus,
            protocol: None,
        }
    }

    pub fn with_protocol(mut self, handler: Arc<ProtocolHandler>) -> Self {
        self.protocol = Some(handler);
        self
    }

    /// Validate and route one line.
    ///
    /// # Errors
    ///
    /// `Malformed` if the line is neither a webhook nor a peer message,
    /// `Rejected` if a webhook payload does not satisfy its topic's schema,
    /// `Unroutable` for a peer message with no handler attached.
    pub async fn ingest_line(&self, line: &str) -> Result<Ingested, IngressError> {
        let parsed: IngressLine = serde_json::from_str(line).map_err(|e| {
            BUS_WEBHOOKS_REJECTED.with_label_values(&["malformed"]).inc();
            IngressError::from(e)
        })?;

        match parsed {
            IngressLine::Webhook(webhook) => self.publish(webhook).await,
            IngressLine::Inbound(envelope) => self.dispatch(envelope),
        }
    }

    async fn publish(&self, webhook: WebhookLine) -> Result<Ingested, IngressError> {
        match self.bus.publish_webhook(&webhook.topic, webhook.payload).await {
            Ok(resolved) => Ok(Ingested::Published(resolved)),
            Err(e) if e.is_progress() => Ok(Ingested::Skipped),
            Err(e) => {
                BUS_WEBHOOKS_REJECTED
                    .with_label_values(&[webhook.topic.as_str()])
                    .inc();
                Err(e.into())
            }
        }
    }

    fn dispatch(&self, envelope: InboundEnvelope) -> Result<Ingested, IngressError> {
        let handler = self
            .protocol
            .as_ref()
            .map(Arc::clone)
            .ok_or(IngressError::Unroutable(envelope.message.type_name()))?;

        // Verification can take minutes; the read loop must not wait on it
        tokio::spawn(async move {
            // Failures are logged and counted by the handler
            let _ = handler.handle(envelope).await;
        });
        Ok(Ingested::Dispatched)
    }

    /// Read lines until EOF or shutdown.
    pub async fn run<R>(&self, reader: R, mut shutdown: watch::Receiver<bool>) -> IngressStats
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut stats = IngressStats::default();
        info!("[ingress] Webhook ingress started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[ingress] Shutdown signal received");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match self.ingest_line(&line).await {
                        Ok(Ingested::Published(resolved)) => {
                            stats.accepted += 1;
                            debug!(resolved, "[ingress] Webhook published");
                        }
                        Ok(Ingested::Skipped) => {
                            stats.skipped += 1;
                        }
                        Ok(Ingested::Dispatched) => {
                            stats.dispatched += 1;
                            debug!("[ingress] Peer message dispatched");
                        }
                        Err(e) => {
                            stats.rejected += 1;
                            warn!(error = %e, "[ingress] Line dropped");
                        }
                    },
                    Ok(None) => {
                        info!("[ingress] Input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "[ingress] Read failed, stopping");
                        break;
                    }
                },
            }
        }

        info!(
            accepted = stats.accepted,
            skipped = stats.skipped,
            dispatched = stats.dispatched,
            rejected = stats.rejected,
            "[ingress] Webhook ingress stopped"
        );
        stats
    }
}
