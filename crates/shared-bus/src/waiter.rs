//! # Correlation Waiter
//!
//! Scoped ownership of a one-shot subscription. The waiter holds the
//! [`Subscription`] by value, so every way out of a wait releases it from the
//! bus synchronously:
//!
//! - normal return from [`CorrelationWaiter::wait`]
//! - early return or `?` before waiting (the waiter is dropped)
//! - cancellation: the `wait` future owns the waiter, so aborting the task
//!   drops it before the abort is observed through the `JoinHandle`
//!
//! Waits always carry a deadline.

use crate::subscriber::{Subscription, SubscriptionError, SubscriptionId, SubscriptionState};
use shared_types::AgentEvent;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a wait ended without an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// No matching event arrived before the deadline.
    #[error("No matching event within {after:?}")]
    TimedOut { after: Duration },

    /// The subscription was removed or the bus shut down.
    #[error("Subscription closed before resolving")]
    Closed,
}

/// A handle over one pending subscription, released on drop.
#[derive(Debug)]
pub struct CorrelationWaiter {
    subscription: Subscription,
}

impl CorrelationWaiter {
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    /// Suspend until the subscription resolves or `deadline` elapses.
    ///
    /// Consumes the waiter; its subscription is released when this returns.
    ///
    /// # Errors
    ///
    /// - `WaitError::TimedOut` if the deadline elapsed first
    /// - `WaitError::Closed` if the subscription was removed underneath us
    pub async fn wait(mut self, deadline: Duration) -> Result<AgentEvent, WaitError> {
        match tokio::time::timeout(deadline, self.subscription.recv()).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(SubscriptionError::Closed | SubscriptionError::Consumed)) => {
                Err(WaitError::Closed)
            }
            Err(_) => {
                debug!(id = %self.subscription.id(), ?deadline, "Wait timed out");
                Err(WaitError::TimedOut { after: deadline })
            }
        }
    }
}
