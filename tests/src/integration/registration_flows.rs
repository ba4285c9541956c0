//! # Credential-Gated Registration Flows
//!
//! Drives `VerificationOrchestrator` end to end: proof requests go to a mock
//! prover, presentations come back through `publish_webhook`, and records
//! land in the in-memory store.
//!
//! ## Flows Tested
//!
//! ```text
//! register ──→ [car-registration] ──proof──→ prover ──present_proof_done──┐
//!          └─→ [car-type] ──proof──→ prover ──present_proof_done──────────┤
//!                                                                         ↓
//!                         store + registered_service ←── merge per sub-flow
//! ```

#[cfg(test)]
mod tests {
    use serde_json::json;
    use service_registry::{
        join_sorted, presentation_webhook, InMemoryRecordStore, MockProofRequester,
        ProofRequester, PublishStrategy, RecordStore, RegistryConfig, ServiceRegistryApi,
        SubflowError, VerificationOrchestrator, CAR_REGISTRATION_SCHEMA, CAR_TYPE_SCHEMA,
    };
    use shared_bus::{InMemoryEventBus, TopicMatcher};
    use shared_types::{AgentEvent, ConnectionId, RecordState, Topic};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn car_holder_values() -> BTreeMap<String, String> {
        [
            ("0_car_registration", "W-4711"),
            ("0_car_make", "Skoda"),
            ("0_car_model", "Octavia"),
            ("0_car_year", "2019"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    struct Fixture {
        bus: Arc<InMemoryEventBus>,
        prover: Arc<MockProofRequester>,
        store: Arc<InMemoryRecordStore>,
        orchestrator: VerificationOrchestrator,
    }

    fn fixture(prover: MockProofRequester, bus: Arc<InMemoryEventBus>, strategy: PublishStrategy) -> Fixture {
        let prover = Arc::new(prover);
        let store = Arc::new(InMemoryRecordStore::new());
        let orchestrator = VerificationOrchestrator::new(
            Arc::clone(&bus),
            Arc::clone(&prover) as Arc<dyn ProofRequester>,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            RegistryConfig::for_testing().with_strategy(strategy),
        );
        Fixture {
            bus,
            prover,
            store,
            orchestrator,
        }
    }

    fn honest_holder(strategy: PublishStrategy) -> Fixture {
        let bus = Arc::new(InMemoryEventBus::new());
        let prover = MockProofRequester::revealing(Arc::clone(&bus), car_holder_values());
        fixture(prover, bus, strategy)
    }

    fn car_owner() -> ConnectionId {
        ConnectionId::new("conn-car-owner")
    }

    // =========================================================================
    // PARTIAL-FAILURE ISOLATION
    // =========================================================================

    #[tokio::test]
    async fn test_car_type_send_error_does_not_block_car_registration() {
        let f = honest_holder(PublishStrategy::Incremental);
        f.prover.fail_schema(CAR_TYPE_SCHEMA);
        let mut failures = f.bus.tap(TopicMatcher::exact(Topic::SubflowFailed));

        let registration = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();
        let record_id = registration.record_id();
        let outcomes = timeout(Duration::from_secs(5), registration.join())
            .await
            .unwrap();

        let registration_outcome = outcomes
            .iter()
            .find(|o| o.schema == CAR_REGISTRATION_SCHEMA)
            .unwrap();
        assert_eq!(registration_outcome.value(), Some("W-4711"));

        let stored = f.store.load(&record_id).await.unwrap();
        assert_eq!(stored.state, RecordState::Updated);
        assert_eq!(stored.attribute(CAR_REGISTRATION_SCHEMA), Some("W-4711"));
        assert!(stored.attribute(CAR_TYPE_SCHEMA).is_none());

        match failures.try_recv() {
            Some(AgentEvent::SubflowFailed(failure)) => {
                assert_eq!(failure.record_id, record_id);
                assert_eq!(failure.schema, CAR_TYPE_SCHEMA);
            }
            other => panic!("expected a sub-flow failure, got {other:?}"),
        }
        assert_eq!(f.bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_failure_surfaces_without_join() {
        let f = honest_holder(PublishStrategy::Incremental);
        f.prover.fail_schema(CAR_TYPE_SCHEMA);
        let mut failures = f.bus.tap(TopicMatcher::exact(Topic::SubflowFailed));

        // Handle dropped; nobody awaits the sub-flows
        drop(
            f.orchestrator
                .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
                .await
                .unwrap(),
        );

        let failure = timeout(Duration::from_secs(5), failures.recv())
            .await
            .unwrap();
        assert!(matches!(failure, Some(AgentEvent::SubflowFailed(_))));
        assert_eq!(f.orchestrator.failed_subflows(), 1);
    }

    #[tokio::test]
    async fn test_unverified_presentation_fails_only_its_subflow() {
        let bus = Arc::new(InMemoryEventBus::new());
        let values = car_holder_values();
        let prover = MockProofRequester::presenting(Arc::clone(&bus), move |request, exchange_id| {
            let verified = request.schema != CAR_TYPE_SCHEMA;
            let revealed: BTreeMap<&String, &String> = request
                .requested_attributes
                .keys()
                .filter_map(|r| values.get(r).map(|v| (r, v)))
                .collect();
            Some(presentation_webhook(exchange_id, verified, &revealed))
        });
        let f = fixture(prover, bus, PublishStrategy::Incremental);

        let outcomes = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap()
            .join()
            .await;

        let car_type = outcomes.iter().find(|o| o.schema == CAR_TYPE_SCHEMA).unwrap();
        assert!(matches!(car_type.result, Err(SubflowError::NotVerified { .. })));
        assert_eq!(outcomes.iter().filter(|o| o.is_done()).count(), 1);
    }

    // =========================================================================
    // EXCHANGE STATE GATE
    // =========================================================================

    const RUNTIME_PRESENTATION_TOPIC: &str = "acapy::webhook::present_proof_v2_0";

    /// Block until the prover has received `n` proof requests.
    async fn await_requests(prover: &MockProofRequester, n: usize) {
        while prover.request_count() < n {
            tokio::task::yield_now().await;
        }
    }

    /// Runtime-shaped `done` webhook revealing every requested referent.
    fn done_webhook(exchange_id: String, referents: Vec<String>) -> serde_json::Value {
        let values = car_holder_values();
        let revealed: serde_json::Map<String, serde_json::Value> = referents
            .into_iter()
            .filter_map(|r| values.get(&r).map(|v| (r, json!({"raw": v}))))
            .collect();
        json!({
            "pres_ex_id": exchange_id,
            "state": "done",
            "verified": "true",
            "by_format": {"pres": {"indy": {"requested_proof": {"revealed_attrs": revealed}}}},
        })
    }

    #[tokio::test]
    async fn test_progress_webhooks_leave_verification_waiting() {
        let bus = Arc::new(InMemoryEventBus::new());
        let f = fixture(MockProofRequester::new(), Arc::clone(&bus), PublishStrategy::Incremental);

        let registration = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();
        let record_id = registration.record_id();
        timeout(Duration::from_secs(5), await_requests(&f.prover, 2))
            .await
            .unwrap();

        for (_, exchange_id, request) in f.prover.requests() {
            let progress = bus
                .publish_webhook(
                    RUNTIME_PRESENTATION_TOPIC,
                    json!({"pres_ex_id": exchange_id.to_string(), "state": "request-sent"}),
                )
                .await;
            assert!(matches!(progress, Err(ref e) if e.is_progress()), "{progress:?}");

            tokio::time::sleep(Duration::from_millis(20)).await;
            let referents = request.requested_attributes.keys().cloned().collect();
            let resolved = bus
                .publish_webhook(
                    RUNTIME_PRESENTATION_TOPIC,
                    done_webhook(exchange_id.to_string(), referents),
                )
                .await
                .unwrap();
            assert_eq!(resolved, 1);
        }

        let outcomes = timeout(Duration::from_secs(5), registration.join())
            .await
            .unwrap();
        assert!(outcomes.iter().all(|o| o.is_done()), "{outcomes:?}");
        let stored = f.store.load(&record_id).await.unwrap();
        assert_eq!(stored.attribute(CAR_REGISTRATION_SCHEMA), Some("W-4711"));
        assert_eq!(stored.attribute(CAR_TYPE_SCHEMA), Some("Skoda;Octavia;2019"));
    }

    #[tokio::test]
    async fn test_abandoned_exchange_fails_its_subflow() {
        let bus = Arc::new(InMemoryEventBus::new());
        let f = fixture(MockProofRequester::new(), Arc::clone(&bus), PublishStrategy::Incremental);
        let mut failures = bus.tap(TopicMatcher::exact(Topic::SubflowFailed));

        let registration = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();
        timeout(Duration::from_secs(5), await_requests(&f.prover, 2))
            .await
            .unwrap();

        for (_, exchange_id, request) in f.prover.requests() {
            let payload = if request.schema == CAR_TYPE_SCHEMA {
                json!({"pres_ex_id": exchange_id.to_string(), "state": "abandoned"})
            } else {
                let referents = request.requested_attributes.keys().cloned().collect();
                done_webhook(exchange_id.to_string(), referents)
            };
            bus.publish_webhook(RUNTIME_PRESENTATION_TOPIC, payload)
                .await
                .unwrap();
        }

        let outcomes = timeout(Duration::from_secs(5), registration.join())
            .await
            .unwrap();
        let car_type = outcomes.iter().find(|o| o.schema == CAR_TYPE_SCHEMA).unwrap();
        assert!(matches!(car_type.result, Err(SubflowError::Abandoned { .. })));
        let registration_outcome = outcomes
            .iter()
            .find(|o| o.schema == CAR_REGISTRATION_SCHEMA)
            .unwrap();
        assert_eq!(registration_outcome.value(), Some("W-4711"));
        assert!(matches!(failures.try_recv(), Some(AgentEvent::SubflowFailed(_))));
    }

    #[tokio::test]
    async fn test_presentation_without_verified_flag_is_rejected() {
        let bus = Arc::new(InMemoryEventBus::new());
        let values = car_holder_values();
        let prover = MockProofRequester::presenting(Arc::clone(&bus), move |request, exchange_id| {
            let revealed: BTreeMap<&String, &String> = request
                .requested_attributes
                .keys()
                .filter_map(|r| values.get(r).map(|v| (r, v)))
                .collect();
            Some(json!({"exchangeId": exchange_id.to_string(), "revealedAttributes": revealed}))
        });
        let f = fixture(prover, bus, PublishStrategy::JoinAll);

        let registration = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();

        let record_id = registration.record_id();
        let outcomes = registration.join().await;
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Err(SubflowError::NotVerified { .. }))));
        let stored = f.store.load(&record_id).await.unwrap();
        assert!(stored.credential_attributes.is_empty());
    }

    // =========================================================================
    // PUBLISH STRATEGIES
    // =========================================================================

    #[tokio::test]
    async fn test_incremental_slow_verifier_does_not_hide_progress() {
        let bus = Arc::new(InMemoryEventBus::new());
        let prover = MockProofRequester::revealing(Arc::clone(&bus), car_holder_values())
            .with_delay_for(CAR_TYPE_SCHEMA, Duration::from_millis(200));
        let f = fixture(prover, bus, PublishStrategy::Incremental);
        let mut records = f.bus.tap(TopicMatcher::exact(Topic::ServiceRecord));

        let registration = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();

        // Created, then the fast sub-flow's update, long before car-type lands
        let mut first_update = None;
        while first_update.is_none() {
            match timeout(Duration::from_millis(150), records.recv()).await.unwrap() {
                Some(AgentEvent::ServiceRecord(r)) if r.state == RecordState::Updated => {
                    first_update = Some(r)
                }
                Some(_) => {}
                None => panic!("tap closed"),
            }
        }
        let first_update = first_update.unwrap();
        assert_eq!(first_update.attribute(CAR_REGISTRATION_SCHEMA), Some("W-4711"));
        assert!(first_update.attribute(CAR_TYPE_SCHEMA).is_none());

        registration.join().await;
        let stored = f.store.load(&first_update.id).await.unwrap();
        assert_eq!(stored.attribute(CAR_TYPE_SCHEMA), Some("Skoda;Octavia;2019"));
    }

    #[tokio::test]
    async fn test_join_all_announces_once_with_every_value() {
        let f = honest_holder(PublishStrategy::JoinAll);
        let mut records = f.bus.tap(TopicMatcher::exact(Topic::ServiceRecord));

        let registration = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();

        assert_eq!(registration.record().state, RecordState::Updated);
        assert_eq!(registration.record().credential_attributes.len(), 2);

        let mut announced = Vec::new();
        while let Some(AgentEvent::ServiceRecord(r)) = records.try_recv() {
            announced.push(r.state);
        }
        assert_eq!(announced, vec![RecordState::Created, RecordState::Updated]);
    }

    #[tokio::test]
    async fn test_strategies_agree_on_final_record() {
        let incremental = honest_holder(PublishStrategy::Incremental);
        let join_all = honest_holder(PublishStrategy::JoinAll);

        let a = incremental
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();
        let a_id = a.record_id();
        a.join().await;
        let b = join_all
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();

        let a_record = incremental.store.load(&a_id).await.unwrap();
        let b_record = join_all.store.load(&b.record_id()).await.unwrap();
        assert_eq!(a_record.credential_attributes, b_record.credential_attributes);
    }

    // =========================================================================
    // DETERMINISTIC MERGE
    // =========================================================================

    #[test]
    fn test_merge_independent_of_wire_order() {
        let forward = join_sorted(vec![("a", "1"), ("b", "2")]);
        let reversed = join_sorted(vec![("b", "2"), ("a", "1")]);
        assert_eq!(forward, reversed);
        assert_eq!(forward, "1;2");
    }

    #[tokio::test]
    async fn test_nested_presentation_shape_merges_in_referent_order() {
        let bus = Arc::new(InMemoryEventBus::new());
        // Agent-native nested payload, attributes listed out of order
        let prover = MockProofRequester::presenting(Arc::clone(&bus), |request, exchange_id| {
            let revealed = if request.schema == CAR_TYPE_SCHEMA {
                json!({
                    "0_car_year": {"raw": "2019"},
                    "0_car_make": {"raw": "Skoda"},
                    "0_car_model": {"raw": "Octavia"},
                })
            } else {
                json!({"0_car_registration": {"raw": "W-4711"}})
            };
            Some(json!({
                "pres_ex_id": exchange_id.to_string(),
                "verified": "true",
                "by_format": {"pres": {"indy": {"requested_proof": {"revealed_attrs": revealed}}}},
            }))
        });
        let f = fixture(prover, bus, PublishStrategy::JoinAll);

        let registration = f
            .orchestrator
            .register_service_with_verification(&car_owner(), "did:sov:owner", "car-sharing")
            .await
            .unwrap();

        assert_eq!(
            registration.record().attribute(CAR_TYPE_SCHEMA),
            Some("Skoda;Octavia;2019")
        );
    }

    // =========================================================================
    // LISTING
    // =========================================================================

    #[tokio::test]
    async fn test_list_services_filters_by_schema() {
        let f = honest_holder(PublishStrategy::JoinAll);
        for schema in ["car-sharing", "car-sharing", "parking"] {
            f.orchestrator
                .register_service_with_verification(&car_owner(), "did:sov:owner", schema)
                .await
                .unwrap();
        }

        assert_eq!(f.orchestrator.list_services(None).await.unwrap().len(), 3);
        assert_eq!(
            f.orchestrator
                .list_services(Some("car-sharing"))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(f.prover.request_count(), 6);
    }
}
