//! # Sidecar Runtime Flows
//!
//! Runs the full runtime over in-memory pipes, with a scripted agent process
//! on the other side:
//!
//! ```text
//! [Bridge/Registry] → JsonLineOutbox → pipe → scripted agent ← peer messages
//!                                                    │
//!          waiters ← Event Bus ← WebhookIngress ← pipe
//!                                     │
//!                              ProtocolHandler
//! ```

#[cfg(test)]
mod tests {
    use agent_runtime::adapters::JsonLineOutbox;
    use agent_runtime::{AgentConfig, AgentContainer, AgentRuntime, Transports};
    use request_bridge::{BridgeError, RequestBridgeApi};
    use serde_json::{json, Map, Value};
    use service_registry::{
        InMemoryRecordStore, RecordStore, ServiceRegistryApi, CAR_REGISTRATION_SCHEMA,
        CAR_TYPE_SCHEMA,
    };
    use shared_types::{ConnectionId, RecordState};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // =========================================================================
    // SCRIPTED AGENT
    // =========================================================================

    /// Answers every outbox line the way a cooperative remote would.
    fn answer(line: &Value) -> Option<Value> {
        match line["kind"].as_str()? {
            "message" => {
                let message = &line["message"];
                match message["@type"].as_str()? {
                    "RetrieveFile" => {
                        let filename = message["filename"].as_str()?;
                        let payload = if filename == "hello.txt" {
                            json!({"correlationKey": filename, "status": "ok", "content": "aGVsbG8="})
                        } else {
                            json!({"correlationKey": filename, "status": "not_found"})
                        };
                        Some(json!({"topic": "acapy::webhook::retrievefile_result", "payload": payload}))
                    }
                    _ => None,
                }
            }
            "proof_request" => {
                let holder: Map<String, Value> = [
                    ("0_car_registration", "B-1234"),
                    ("0_car_make", "Fiat"),
                    ("0_car_model", "Panda"),
                    ("0_car_year", "2012"),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::from(v)))
                .collect();
                let revealed: Map<String, Value> = line["request"]["requested_attributes"]
                    .as_object()?
                    .keys()
                    .filter_map(|r| holder.get(r).map(|v| (r.clone(), v.clone())))
                    .collect();
                Some(json!({
                    "topic": "present_proof_done",
                    "payload": {
                        "exchangeId": line["exchangeId"],
                        "verified": true,
                        "revealedAttributes": revealed,
                    }
                }))
            }
            _ => None,
        }
    }

    /// Answers outbox lines, forwards injected peer messages and reports
    /// every outbox line it read on `seen`.
    async fn scripted_agent(
        outbox: DuplexStream,
        mut ingress: DuplexStream,
        mut inject: mpsc::UnboundedReceiver<Value>,
        seen: mpsc::UnboundedSender<Value>,
    ) {
        let mut lines = BufReader::new(outbox).lines();
        loop {
            let forward = tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let line: Value = serde_json::from_str(&line).unwrap();
                        let reply = answer(&line);
                        let _ = seen.send(line);
                        reply
                    }
                    _ => break,
                },
                Some(peer) = inject.recv() => Some(peer),
            };
            if let Some(forward) = forward {
                let mut bytes = serde_json::to_vec(&forward).unwrap();
                bytes.push(b'\n');
                if ingress.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        }
    }

    struct Sidecar {
        runtime: AgentRuntime,
        store: Arc<InMemoryRecordStore>,
        inject: mpsc::UnboundedSender<Value>,
        seen: mpsc::UnboundedReceiver<Value>,
    }

    impl Sidecar {
        /// Deliver a message from a peer, as the agent would forward it.
        fn from_peer(&self, sender_did: &str, message: Value) {
            self.inject
                .send(json!({
                    "connectionId": remote().as_str(),
                    "senderDid": sender_did,
                    "message": message,
                }))
                .unwrap();
        }

        /// Next outbox line the agent read that satisfies `wanted`.
        async fn next_written(&mut self, wanted: impl Fn(&Value) -> bool) -> Value {
            timeout(Duration::from_secs(5), async {
                loop {
                    let line = self.seen.recv().await.expect("agent stopped");
                    if wanted(&line) {
                        return line;
                    }
                }
            })
            .await
            .expect("no matching outbox line")
        }
    }

    fn sidecar() -> Sidecar {
        let (outbox_end, agent_in) = duplex(64 * 1024);
        let (agent_out, ingress_end) = duplex(64 * 1024);

        let outbox = Arc::new(JsonLineOutbox::new(outbox_end));
        let store = Arc::new(InMemoryRecordStore::new());
        let container = AgentContainer::new(
            AgentConfig::default(),
            Transports {
                messages: outbox.clone(),
                proofs: outbox,
                records: Arc::clone(&store) as Arc<dyn RecordStore>,
            },
        );

        let runtime = AgentRuntime::new(container);
        runtime.start();
        runtime.spawn_ingress(BufReader::new(ingress_end));
        let (inject, inject_rx) = mpsc::unbounded_channel();
        let (seen_tx, seen) = mpsc::unbounded_channel();
        tokio::spawn(scripted_agent(agent_in, agent_out, inject_rx, seen_tx));

        Sidecar {
            runtime,
            store,
            inject,
            seen,
        }
    }

    fn remote() -> ConnectionId {
        ConnectionId::new("conn-remote")
    }

    // =========================================================================
    // FLOWS
    // =========================================================================

    #[tokio::test]
    async fn test_file_round_trip_through_pipes() {
        let s = sidecar();

        let content = timeout(
            Duration::from_secs(5),
            s.runtime.bridge().retrieve_file(&remote(), "hello.txt"),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(content, b"hello");
        assert_eq!(s.runtime.bus().active_subscriptions(), 0);
        s.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_not_found_through_pipes() {
        let s = sidecar();

        let err = timeout(
            Duration::from_secs(5),
            s.runtime.bridge().retrieve_file(&remote(), "missing.txt"),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, BridgeError::Status { .. }));
        assert_eq!(err.http_status(), 404);
        s.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_registration_verified_through_pipes() {
        let s = sidecar();

        let registration = s
            .runtime
            .registry()
            .register_service_with_verification(&remote(), "did:sov:fiat", "car-sharing")
            .await
            .unwrap();
        let record_id = registration.record_id();
        let outcomes = timeout(Duration::from_secs(5), registration.join())
            .await
            .unwrap();

        assert!(outcomes.iter().all(|o| o.is_done()));
        let stored = s.store.load(&record_id).await.unwrap();
        assert_eq!(stored.state, RecordState::Updated);
        assert_eq!(stored.attribute(CAR_REGISTRATION_SCHEMA), Some("B-1234"));
        assert_eq!(stored.attribute(CAR_TYPE_SCHEMA), Some("Fiat;Panda;2012"));
        s.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_inflight_request() {
        let s = sidecar();
        let bridge = s.runtime.bridge();

        // The scripted agent never answers a chunk request
        let request =
            tokio::spawn(async move { bridge.fetch_chunk(&remote(), "seg-1.m4s").await });
        while s.runtime.bridge().pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        s.runtime.shutdown().await;

        let result = timeout(Duration::from_secs(5), request).await.unwrap().unwrap();
        assert!(matches!(result, Err(BridgeError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_peer_registration_is_verified_through_pipes() {
        let s = sidecar();

        s.from_peer(
            "did:sov:peer",
            json!({"@type": "RegisterService", "schema": "car-sharing"}),
        );

        let stored = timeout(Duration::from_secs(5), async {
            loop {
                let records = s.store.query(Some("car-sharing")).await.unwrap();
                if let Some(record) = records
                    .into_iter()
                    .find(|r| r.credential_attributes.len() == 2)
                {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(stored.owner_identity, "did:sov:peer");
        assert_eq!(stored.state, RecordState::Updated);
        assert_eq!(stored.attribute(CAR_REGISTRATION_SCHEMA), Some("B-1234"));
        assert_eq!(stored.attribute(CAR_TYPE_SCHEMA), Some("Fiat;Panda;2012"));
        s.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_query_is_answered_through_pipes() {
        let mut s = sidecar();
        let registration = s
            .runtime
            .registry()
            .register_service_with_verification(&remote(), "did:sov:fiat", "car-sharing")
            .await
            .unwrap();
        timeout(Duration::from_secs(5), registration.join())
            .await
            .unwrap();

        s.from_peer(
            "did:sov:peer",
            json!({"@type": "QueryServices", "schema": "car-sharing"}),
        );
        let line = s
            .next_written(|l| l["message"]["@type"] == "QueryServicesResponse")
            .await;

        assert_eq!(line["kind"], "message");
        assert_eq!(line["connectionId"], remote().as_str());
        let services = line["message"]["services"].as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["ownerIdentity"], "did:sov:fiat");
        s.runtime.shutdown().await;
    }
}
