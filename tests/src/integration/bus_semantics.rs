//! # Bus Delivery Semantics
//!
//! Exercises the event bus and correlation waiter together:
//!
//! 1. **Predicate filtering**: a non-matching event leaves a waiter pending
//! 2. **Exactly-once**: a second matching event is never observed
//! 3. **Leak-freedom**: success, error and cancellation all release the
//!    subscription
//! 4. **No buffering**: a late waiter never sees an earlier event

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use shared_bus::{
        by_correlation_key, EventPublisher, EventSubscriber, InMemoryEventBus, SubscriptionState,
        TopicMatcher, WaitError,
    };
    use shared_types::{AgentEvent, CorrelationKey, ReplyPayload, ReplyStatus, Topic};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn file_ok(key: &str, content: &str) -> AgentEvent {
        AgentEvent::FileResult(ReplyPayload::ok(key, content))
    }

    fn file_waiter(bus: &InMemoryEventBus, key: &str) -> shared_bus::CorrelationWaiter {
        bus.open(
            TopicMatcher::exact(Topic::FileResult),
            by_correlation_key(CorrelationKey::new(key)),
        )
    }

    // =========================================================================
    // PREDICATE FILTERING
    // =========================================================================

    proptest! {
        /// A waiter stays pending for every event its predicate rejects.
        #[test]
        fn prop_rejected_event_leaves_waiter_pending(
            wanted in "[a-z]{1,8}\\.txt",
            other in "[a-z]{1,8}\\.bin",
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let bus = InMemoryEventBus::new();
                let waiter = file_waiter(&bus, &wanted);

                let resolved = bus.publish(file_ok(&other, "AA==")).await;

                prop_assert_eq!(resolved, 0);
                prop_assert_eq!(waiter.state(), SubscriptionState::Pending);
                Ok(())
            })?;
        }
    }

    #[tokio::test]
    async fn test_wrong_topic_does_not_resolve() {
        let bus = InMemoryEventBus::new();
        let waiter = file_waiter(&bus, "a.txt");

        bus.publish(AgentEvent::ChunkResult(ReplyPayload::ok("a.txt", "AA==")))
            .await;

        let mut wait = tokio_test::task::spawn(waiter.wait(Duration::from_secs(5)));
        assert_pending!(wait.poll());

        bus.publish(file_ok("a.txt", "aGVsbG8=")).await;
        assert!(wait.is_woken());
        let event = assert_ready!(wait.poll()).unwrap();
        assert_eq!(event.correlation_key(), Some(CorrelationKey::new("a.txt")));
    }

    #[tokio::test]
    async fn test_waiters_on_one_topic_resolve_independently() {
        let bus = InMemoryEventBus::new();
        let a = file_waiter(&bus, "a.txt");
        let b = file_waiter(&bus, "b.txt");
        let c = file_waiter(&bus, "c.txt");

        assert_eq!(bus.publish(file_ok("b.txt", "Yg==")).await, 1);
        assert_eq!(bus.publish(file_ok("a.txt", "YQ==")).await, 1);

        assert_eq!(a.state(), SubscriptionState::Resolved);
        assert_eq!(b.state(), SubscriptionState::Resolved);
        assert_eq!(c.state(), SubscriptionState::Pending);
    }

    // =========================================================================
    // EXACTLY-ONCE
    // =========================================================================

    #[tokio::test]
    async fn test_second_matching_event_not_observed() {
        let bus = InMemoryEventBus::new();
        let waiter = file_waiter(&bus, "a.txt");

        assert_eq!(bus.publish(file_ok("a.txt", "Zmlyc3Q=")).await, 1);
        assert_eq!(bus.publish(file_ok("a.txt", "c2Vjb25k")).await, 0);

        let event = waiter.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            event.reply().and_then(|r| r.content.as_deref()),
            Some("Zmlyc3Q=")
        );
    }

    // =========================================================================
    // LEAK-FREEDOM
    // =========================================================================

    #[tokio::test]
    async fn test_success_path_releases_subscription() {
        let bus = Arc::new(InMemoryEventBus::new());
        let before = bus.active_subscriptions();

        let waiter = file_waiter(&bus, "a.txt");
        assert_eq!(bus.active_subscriptions(), before + 1);
        bus.publish(file_ok("a.txt", "aGVsbG8=")).await;
        waiter.wait(Duration::from_secs(1)).await.unwrap();

        assert_eq!(bus.active_subscriptions(), before);
    }

    #[tokio::test]
    async fn test_error_paths_release_subscription() {
        let bus = Arc::new(InMemoryEventBus::new());
        let before = bus.active_subscriptions();

        let timed_out = file_waiter(&bus, "slow.txt")
            .wait(Duration::from_millis(10))
            .await;
        assert!(matches!(timed_out, Err(WaitError::TimedOut { .. })));
        assert_eq!(bus.active_subscriptions(), before);

        // Early return before waiting
        let early = || -> Result<(), String> {
            let _waiter = file_waiter(&bus, "early.txt");
            Err("send failed".to_string())
        };
        assert!(early().is_err());
        assert_eq!(bus.active_subscriptions(), before);
    }

    #[tokio::test]
    async fn test_cancellation_releases_before_join_observed() {
        let bus = Arc::new(InMemoryEventBus::new());
        let before = bus.active_subscriptions();

        let waiter = file_waiter(&bus, "never.txt");
        let task = tokio::spawn(waiter.wait(Duration::from_secs(60)));
        tokio::task::yield_now().await;
        assert_eq!(bus.active_subscriptions(), before + 1);

        task.abort();
        let joined = task.await;

        assert!(joined.unwrap_err().is_cancelled());
        assert_eq!(bus.active_subscriptions(), before);
    }

    #[tokio::test]
    async fn test_shutdown_closes_pending_waiters() {
        let bus = Arc::new(InMemoryEventBus::new());
        let waiter = file_waiter(&bus, "a.txt");

        bus.shutdown();

        assert_eq!(
            waiter.wait(Duration::from_secs(1)).await,
            Err(WaitError::Closed)
        );
        assert_eq!(bus.active_subscriptions(), 0);
    }

    // =========================================================================
    // NO BUFFERING
    // =========================================================================

    #[tokio::test]
    async fn test_late_waiter_never_resolves() {
        let bus = InMemoryEventBus::new();
        bus.publish(file_ok("a.txt", "aGVsbG8=")).await;

        let late = file_waiter(&bus, "a.txt");

        assert!(matches!(
            late.wait(Duration::from_millis(20)).await,
            Err(WaitError::TimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_status_still_resolves_waiter() {
        let bus = InMemoryEventBus::new();
        let waiter = file_waiter(&bus, "a.txt");

        bus.publish(AgentEvent::FileResult(ReplyPayload::failed(
            "a.txt",
            ReplyStatus::new(ReplyStatus::NOT_FOUND),
        )))
        .await;

        let event = waiter.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            event.reply().map(|r| r.status.as_str()),
            Some(ReplyStatus::NOT_FOUND)
        );
    }
}
