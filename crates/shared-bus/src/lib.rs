//! # Shared Bus - In-Process Event Bus
//!
//! Process-scoped publish/subscribe hub that turns asynchronous agent
//! webhooks into awaited results.
//!
//! ## Delivery Model
//!
//! ```text
//! ┌──────────────┐  open(matcher, predicate)   ┌──────────────┐
//! │    Caller    │ ──────────────────────────▶ │  Event Bus   │
//! │              │                             │              │
//! │  wait(dl) ◀──┼──── resolves at most once ──│  publish()   │◀── webhooks
//! └──────────────┘                             └──────────────┘
//! ```
//!
//! - **One-shot subscriptions:** each resolves on the first matching event
//!   and never again.
//! - **Unbuffered:** events published before a subscription exists are lost
//!   to it.
//! - **Scoped release:** [`CorrelationWaiter`] removes its subscription on
//!   every exit path, including task cancellation.
//! - **Taps:** [`EventStream`] observers see every matching event without
//!   affecting subscriptions.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;
pub mod waiter;

// Re-export main types
pub use events::{any_event, by_correlation_key, by_exchange_id, Predicate, TopicMatcher};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{
    EventStream, EventSubscriber, Subscription, SubscriptionError, SubscriptionId,
    SubscriptionState,
};
pub use waiter::{CorrelationWaiter, WaitError};
