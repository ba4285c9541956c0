//! # Event Publisher
//!
//! Defines the publishing side of the event bus and its in-memory
//! implementation.

use crate::events::{Predicate, TopicMatcher};
use crate::subscriber::{EventStream, EventSubscriber, SharedTable, Subscription, SubscriptionId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{AgentEvent, PayloadError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// # Returns
    ///
    /// The number of pending subscriptions this event resolved.
    async fn publish(&self, event: AgentEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

struct Tap {
    matcher: TopicMatcher,
    sender: mpsc::UnboundedSender<AgentEvent>,
}

/// In-memory, process-scoped event bus.
///
/// Delivery is at-most-once and unbuffered: an event resolves the pending
/// subscriptions registered at the moment it is published, and is then
/// discarded. A subscription registered afterwards never sees it.
///
/// The subscription table lock is never held across an `.await`. Each publish
/// resolves every matching subscription and feeds the taps under one
/// acquisition of that lock, so waiters and taps observe concurrent publishes
/// in the same order.
pub struct InMemoryEventBus {
    /// One-shot subscriptions.
    table: SharedTable,

    /// Observer taps.
    taps: Mutex<Vec<Tap>>,

    /// Total events published.
    events_published: AtomicU64,

    /// Total subscriptions resolved.
    resolved: AtomicU64,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: SharedTable::default(),
            taps: Mutex::new(Vec::new()),
            events_published: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
        }
    }

    /// Remove a subscription by id. Idempotent.
    ///
    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.table.lock().slots.remove(&id).is_some();
        if removed {
            debug!(%id, "Subscription removed");
        }
        removed
    }

    /// Number of registered one-shot subscriptions (pending or resolved).
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.table.lock().slots.len()
    }

    /// Observe every event matching `matcher` for as long as the stream lives.
    #[must_use]
    pub fn tap(&self, matcher: TopicMatcher) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        debug!(topics = ?matcher.topics, "Tap attached");
        self.taps.lock().push(Tap {
            matcher: matcher.clone(),
            sender,
        });
        EventStream::new(receiver, matcher)
    }

    /// Number of live observer taps.
    #[must_use]
    pub fn tap_count(&self) -> usize {
        self.taps.lock().iter().filter(|t| !t.sender.is_closed()).count()
    }

    /// Total subscriptions resolved since start-up.
    #[must_use]
    pub fn subscriptions_resolved(&self) -> u64 {
        self.resolved.load(Ordering::Relaxed)
    }

    /// Validate a raw webhook and publish it.
    ///
    /// # Errors
    ///
    /// Returns the validation failure; nothing is published in that case.
    pub async fn publish_webhook(&self, topic: &str, payload: Value) -> Result<usize, PayloadError> {
        let event = AgentEvent::from_webhook(topic, payload).map_err(|e| {
            if e.is_progress() {
                debug!(topic, error = %e, "Ignored progress webhook");
            } else {
                warn!(topic, error = %e, "Rejected webhook payload");
            }
            e
        })?;
        Ok(self.publish(event).await)
    }

    /// Close every pending subscription. Waiters observe `Closed`.
    pub fn shutdown(&self) {
        let mut table = self.table.lock();
        let closed = table.slots.len();
        table.slots.clear();
        self.taps.lock().clear();
        debug!(closed, "Event bus shut down");
    }

    /// Resolve matching subscriptions, then feed the taps, under the table lock.
    fn dispatch(&self, event: &AgentEvent) -> usize {
        let topic = event.topic();
        let mut table = self.table.lock();
        let mut resolved = 0;

        // Every matching slot is evaluated; several waiters may share a topic.
        for (id, slot) in table.slots.iter_mut() {
            if slot.sender.is_none() || !slot.matcher.matches(topic) {
                continue;
            }
            if !(slot.predicate)(event) {
                continue;
            }
            if let Some(sender) = slot.sender.take() {
                if sender.send(event.clone()).is_ok() {
                    resolved += 1;
                    trace!(%id, %topic, "Subscription resolved");
                }
            }
        }

        // Lock order: table, then taps
        self.taps.lock().retain(|tap| {
            if !tap.matcher.matches(topic) {
                return !tap.sender.is_closed();
            }
            tap.sender.send(event.clone()).is_ok()
        });
        drop(table);
        resolved
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryEventBus {
    fn drop(&mut self) {
        // Outstanding subscriptions share the table; release their senders.
        self.table.lock().slots.clear();
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, matcher: TopicMatcher, predicate: Predicate) -> Subscription {
        let (id, receiver) = self.table.lock().insert(matcher, predicate);
        trace!(%id, "Subscription registered");
        Subscription::new(id, receiver, Arc::clone(&self.table))
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: AgentEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let resolved = self.dispatch(&event);
        self.resolved.fetch_add(resolved as u64, Ordering::Relaxed);

        debug!(topic = %event.topic(), resolved, "Event published");
        resolved
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
