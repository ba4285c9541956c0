//! # Event Subscriber
//!
//! Defines the subscription side of the event bus: one-shot subscriptions
//! that resolve at most once, and observer taps that see every matching
//! event.

use crate::events::{Predicate, TopicMatcher};
use crate::waiter::CorrelationWaiter;
use parking_lot::Mutex;
use shared_types::AgentEvent;
use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;
use tracing::trace;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscription was removed (or the bus shut down) before resolving.
    #[error("Subscription closed")]
    Closed,

    /// The resolved event was already taken.
    #[error("Subscription already consumed")]
    Consumed,
}

/// Identifier of a one-shot subscription, unique per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle of a subscription. `Pending -> Resolved` happens at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Resolved,
    Closed,
}

/// Trait for subscribing to events from the bus.
pub trait EventSubscriber: Send + Sync {
    /// Register a one-shot subscription. Non-blocking.
    fn subscribe(&self, matcher: TopicMatcher, predicate: Predicate) -> Subscription;

    /// Open a scoped waiter over a fresh subscription.
    fn open(&self, matcher: TopicMatcher, predicate: Predicate) -> CorrelationWaiter {
        CorrelationWaiter::new(self.subscribe(matcher, predicate))
    }
}

pub(crate) struct Slot {
    pub(crate) matcher: TopicMatcher,
    pub(crate) predicate: Predicate,
    /// Taken when the slot resolves.
    pub(crate) sender: Option<oneshot::Sender<AgentEvent>>,
}

/// Registered one-shot subscriptions, evaluated in registration order.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    next_id: u64,
    pub(crate) slots: BTreeMap<SubscriptionId, Slot>,
}

impl SubscriptionTable {
    pub(crate) fn insert(
        &mut self,
        matcher: TopicMatcher,
        predicate: Predicate,
    ) -> (SubscriptionId, oneshot::Receiver<AgentEvent>) {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let (sender, receiver) = oneshot::channel();
        self.slots.insert(
            id,
            Slot {
                matcher,
                predicate,
                sender: Some(sender),
            },
        );
        (id, receiver)
    }
}

pub(crate) type SharedTable = Arc<Mutex<SubscriptionTable>>;

/// A one-shot subscription handle.
///
/// When dropped, the subscription is removed from the bus.
pub struct Subscription {
    id: SubscriptionId,
    receiver: Option<oneshot::Receiver<AgentEvent>>,
    table: SharedTable,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        receiver: oneshot::Receiver<AgentEvent>,
        table: SharedTable,
    ) -> Self {
        Self {
            id,
            receiver: Some(receiver),
            table,
        }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Current lifecycle state, as recorded by the bus.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        match self.table.lock().slots.get(&self.id) {
            None => SubscriptionState::Closed,
            Some(slot) if slot.sender.is_none() => SubscriptionState::Resolved,
            Some(_) => SubscriptionState::Pending,
        }
    }

    /// Wait for the resolving event.
    ///
    /// Cancel-safe: dropping this future before it completes leaves the
    /// subscription intact.
    ///
    /// # Errors
    ///
    /// - `SubscriptionError::Closed` if the subscription was removed first
    /// - `SubscriptionError::Consumed` if the event was already received
    pub async fn recv(&mut self) -> Result<AgentEvent, SubscriptionError> {
        let receiver = self.receiver.as_mut().ok_or(SubscriptionError::Consumed)?;
        let result = receiver.await;
        self.receiver = None;
        result.map_err(|_| SubscriptionError::Closed)
    }

    /// Take the resolving event if it has already arrived.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - The subscription resolved
    /// - `Ok(None)` - Still pending
    /// - `Err(_)` - Closed or already consumed
    pub fn try_recv(&mut self) -> Result<Option<AgentEvent>, SubscriptionError> {
        let receiver = self.receiver.as_mut().ok_or(SubscriptionError::Consumed)?;
        match receiver.try_recv() {
            Ok(event) => {
                self.receiver = None;
                Ok(Some(event))
            }
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => {
                self.receiver = None;
                Err(SubscriptionError::Closed)
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = self.table.lock().slots.remove(&self.id).is_some();
        trace!(id = %self.id, removed, "Subscription dropped");
    }
}

/// An observer stream of every event matching a topic filter.
///
/// Implements `tokio_stream::Stream` for use with stream combinators. Events
/// published before the tap was created are not replayed.
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<AgentEvent>,
    matcher: TopicMatcher,
}

impl EventStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<AgentEvent>, matcher: TopicMatcher) -> Self {
        Self { receiver, matcher }
    }

    #[must_use]
    pub fn matcher(&self) -> &TopicMatcher {
        &self.matcher
    }

    /// Receive the next tapped event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.receiver.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
