//! # Bridged Request Flows
//!
//! Drives `OutboundRequestBridge` against the real bus with a mock transport
//! standing in for the remote agent.
//!
//! ## Flows Tested
//!
//! 1. `RetrieveFile` → `file_result` ok → decoded bytes
//! 2. `RetrieveFile` → `file_result` not_found → status error, no decode
//! 3. Many concurrent requests on one reply topic, each answered correctly
//! 4. Send failure and timeout leave no subscription behind

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use request_bridge::{
        BridgeConfig, BridgeError, MockSender, OutboundMessage, OutboundRequestBridge,
        RequestBridgeApi, SendError,
    };
    use serde_json::json;
    use shared_bus::{InMemoryEventBus, TopicMatcher};
    use shared_types::{AgentEvent, ConnectionId, CorrelationKey, ReplyStatus, Topic};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Remote agent serving a fixed set of files by name.
    fn file_server(bus: &Arc<InMemoryEventBus>) -> MockSender {
        MockSender::replying(Arc::clone(bus), |message| match message {
            OutboundMessage::RetrieveFile { filename } if filename == "a.txt" => Some((
                "file_result".to_string(),
                json!({"correlationKey": "a.txt", "status": "ok", "content": "aGVsbG8="}),
            )),
            OutboundMessage::RetrieveFile { filename } if filename == "bad.txt" => Some((
                "file_result".to_string(),
                json!({"correlationKey": "bad.txt", "status": "ok", "content": "***"}),
            )),
            OutboundMessage::RetrieveFile { filename } => Some((
                "file_result".to_string(),
                json!({"correlationKey": filename, "status": "not_found"}),
            )),
            _ => None,
        })
    }

    fn bridge(bus: &Arc<InMemoryEventBus>, sender: MockSender) -> OutboundRequestBridge {
        OutboundRequestBridge::new(
            Arc::clone(bus),
            Arc::new(sender),
            BridgeConfig::for_testing(),
        )
    }

    fn peer() -> ConnectionId {
        ConnectionId::new("conn-peer")
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    #[tokio::test]
    async fn test_file_result_ok_decodes_content() {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = bridge(&bus, file_server(&bus));

        let content = bridge
            .request_and_wait(
                CorrelationKey::new("a.txt"),
                |key| OutboundMessage::RetrieveFile {
                    filename: key.as_str().to_string(),
                },
                &peer(),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(content, b"hello");
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_status_error() {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = bridge(&bus, file_server(&bus));

        let err = bridge.retrieve_file(&peer(), "missing.txt").await.unwrap_err();

        match err {
            BridgeError::Status {
                status,
                correlation_key,
            } => {
                assert_eq!(status.as_str(), ReplyStatus::NOT_FOUND);
                assert_eq!(correlation_key, CorrelationKey::new("missing.txt"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert_eq!(bridge.stats().status_failures, 1);
        assert_eq!(bridge.stats().decode_failures, 0);
    }

    #[tokio::test]
    async fn test_malformed_content_is_client_error() {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = bridge(&bus, file_server(&bus));

        let err = bridge.retrieve_file(&peer(), "bad.txt").await.unwrap_err();

        assert!(matches!(err, BridgeError::Decode { .. }));
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn test_concurrent_requests_each_get_their_reply() {
        let bus = Arc::new(InMemoryEventBus::new());
        let sender = MockSender::replying(Arc::clone(&bus), |message| match message {
            OutboundMessage::FetchChunk { chunk } => Some((
                "chunk_result".to_string(),
                json!({"chunk": chunk, "status": 200, "data": "c2VnbWVudA=="}),
            )),
            _ => None,
        })
        .with_delay(Duration::from_millis(5));
        let bridge = Arc::new(bridge(&bus, sender));

        let requests = (0..20).map(|i| {
            let bridge = Arc::clone(&bridge);
            async move { bridge.fetch_chunk(&peer(), &format!("seg-{i}.m4s")).await }
        });
        let results = timeout(Duration::from_secs(5), join_all(requests))
            .await
            .unwrap();

        assert!(results.iter().all(|r| r.as_deref() == Ok(b"segment".as_slice())));
        assert_eq!(bridge.stats().completed, 20);
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_without_waiting() {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = bridge(
            &bus,
            MockSender::failing(SendError::Unreachable(peer())),
        );

        let started = tokio::time::Instant::now();
        let err = bridge.retrieve_file(&peer(), "a.txt").await.unwrap_err();

        assert!(matches!(err, BridgeError::Send(SendError::Unreachable(_))));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(bus.active_subscriptions(), 0);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_silent_remote_times_out() {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = bridge(&bus, MockSender::new());

        let err = bridge.retrieve_file(&peer(), "a.txt").await.unwrap_err();

        assert!(matches!(err, BridgeError::TimedOut { .. }));
        assert_eq!(bridge.stats().timeouts, 1);
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_publishes_request_metrics() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut metrics = bus.tap(TopicMatcher::exact(Topic::RequestMetrics));
        let bridge = bridge(&bus, file_server(&bus));

        bridge.retrieve_file(&peer(), "a.txt").await.unwrap();

        match metrics.try_recv() {
            Some(AgentEvent::RequestMetrics(m)) => {
                assert_eq!(m.correlation_key, CorrelationKey::new("a.txt"));
                assert_eq!(m.reply_topic, Topic::FileResult);
            }
            other => panic!("expected request metrics, got {other:?}"),
        }
    }
}
