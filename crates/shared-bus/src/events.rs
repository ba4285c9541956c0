//! # Event Matching
//!
//! Topic filters and payload predicates used to select events on the bus.
//! Event types themselves live in `shared-types`.

use shared_types::{AgentEvent, CorrelationKey, ExchangeId, Topic};

/// Payload predicate evaluated against each event on a matching topic.
///
/// Predicates run while the bus holds its subscription lock: they must be
/// cheap and must not call back into the bus.
pub type Predicate = Box<dyn Fn(&AgentEvent) -> bool + Send + Sync>;

/// Filter selecting which topics a subscription listens on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMatcher {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<Topic>,
}

impl TopicMatcher {
    /// Match a single topic.
    #[must_use]
    pub fn exact(topic: Topic) -> Self {
        Self {
            topics: vec![topic],
        }
    }

    /// Match any of several topics.
    #[must_use]
    pub fn topics(topics: Vec<Topic>) -> Self {
        Self { topics }
    }

    /// Match every topic.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn matches(&self, topic: Topic) -> bool {
        self.topics.is_empty() || self.topics.contains(&topic)
    }
}

/// Accept every event on the matched topics.
#[must_use]
pub fn any_event() -> Predicate {
    Box::new(|_| true)
}

/// Accept events whose correlation key equals `key`.
#[must_use]
pub fn by_correlation_key(key: CorrelationKey) -> Predicate {
    Box::new(move |event| event.correlation_key().as_ref() == Some(&key))
}

/// Accept presentation completions for one exchange.
#[must_use]
pub fn by_exchange_id(exchange_id: ExchangeId) -> Predicate {
    Box::new(move |event| event.exchange_id() == Some(exchange_id))
}
