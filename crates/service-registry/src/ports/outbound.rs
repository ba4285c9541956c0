//! # Outbound Ports
//!
//! Capabilities the registry needs from the surrounding agent: sending proof
//! requests and persisting service records.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use request_bridge::SendError;
use serde_json::{json, Value};
use shared_bus::InMemoryEventBus;
use shared_types::{ConnectionId, ExchangeId, RecordId, ServiceRecord, Topic};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::{ProofRequest, StoreError};

/// Proof-request transport - outbound port.
///
/// The exchange id is chosen by the caller so the completion waiter can be
/// opened before the request leaves.
#[async_trait]
pub trait ProofRequester: Send + Sync {
    async fn request_proof(
        &self,
        destination: &ConnectionId,
        exchange_id: ExchangeId,
        request: &ProofRequest,
    ) -> Result<(), SendError>;
}

/// Service record persistence - outbound port.
///
/// Records are saved whole; callers serialize read-modify-write per record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, id: &RecordId) -> Result<ServiceRecord, StoreError>;

    async fn save(&self, record: &ServiceRecord) -> Result<(), StoreError>;

    /// Records offering `schema`, or every record. Oldest first.
    async fn query(&self, schema: Option<&str>) -> Result<Vec<ServiceRecord>, StoreError>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Record store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: DashMap<RecordId, ServiceRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load(&self, id: &RecordId) -> Result<ServiceRecord, StoreError> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*id))
    }

    async fn save(&self, record: &ServiceRecord) -> Result<(), StoreError> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn query(&self, schema: Option<&str>) -> Result<Vec<ServiceRecord>, StoreError> {
        let mut records: Vec<ServiceRecord> = self
            .records
            .iter()
            .filter(|entry| schema.map_or(true, |s| entry.schema_name == s))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Builds the `present_proof_done` webhook a simulated prover would cause.
pub type Presenter = Box<dyn Fn(&ProofRequest, ExchangeId) -> Option<Value> + Send + Sync>;

struct Presentations {
    bus: Arc<InMemoryEventBus>,
    presenter: Presenter,
    delays: HashMap<String, Duration>,
}

/// Mock proof transport that records requests and can simulate provers.
pub struct MockProofRequester {
    requests: Mutex<Vec<(ConnectionId, ExchangeId, ProofRequest)>>,
    failing: Mutex<HashSet<String>>,
    presentations: Option<Presentations>,
}

impl MockProofRequester {
    /// Accept every request; never present.
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            presentations: None,
        }
    }

    /// Publish the presenter's webhook for every accepted request.
    pub fn presenting<F>(bus: Arc<InMemoryEventBus>, presenter: F) -> Self
    where
        F: Fn(&ProofRequest, ExchangeId) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            presentations: Some(Presentations {
                bus,
                presenter: Box::new(presenter),
                delays: HashMap::new(),
            }),
            ..Self::new()
        }
    }

    /// A prover holding `values` (referent to raw value) that reveals every
    /// requested referent it has.
    pub fn revealing(bus: Arc<InMemoryEventBus>, values: BTreeMap<String, String>) -> Self {
        Self::presenting(bus, move |request, exchange_id| {
            let revealed: BTreeMap<&String, &String> = request
                .requested_attributes
                .keys()
                .filter_map(|referent| values.get(referent).map(|v| (referent, v)))
                .collect();
            Some(presentation_webhook(exchange_id, true, &revealed))
        })
    }

    /// Present for `schema` only after `delay`, from a background task.
    pub fn with_delay_for(mut self, schema: &str, delay: Duration) -> Self {
        if let Some(p) = self.presentations.as_mut() {
            p.delays.insert(schema.to_string(), delay);
        }
        self
    }

    /// Reject subsequent requests for `schema` with a transport error.
    pub fn fail_schema(&self, schema: &str) {
        self.failing.lock().insert(schema.to_string());
    }

    pub fn requests(&self) -> Vec<(ConnectionId, ExchangeId, ProofRequest)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockProofRequester {
    fn default() -> Self {
        Self::new()
    }
}

/// A `present_proof_done` webhook body in the flat form.
pub fn presentation_webhook<K, V>(
    exchange_id: ExchangeId,
    verified: bool,
    revealed: &BTreeMap<K, V>,
) -> Value
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    json!({
        "exchangeId": exchange_id.to_string(),
        "verified": verified,
        "revealedAttributes": revealed,
    })
}

#[async_trait]
impl ProofRequester for MockProofRequester {
    async fn request_proof(
        &self,
        destination: &ConnectionId,
        exchange_id: ExchangeId,
        request: &ProofRequest,
    ) -> Result<(), SendError> {
        self.requests
            .lock()
            .push((destination.clone(), exchange_id, request.clone()));

        if self.failing.lock().contains(&request.schema) {
            return Err(SendError::Transport(format!(
                "proof request for {} rejected",
                request.schema
            )));
        }

        let Some(p) = &self.presentations else {
            return Ok(());
        };
        let Some(payload) = (p.presenter)(request, exchange_id) else {
            return Ok(());
        };

        let topic = Topic::PresentationDone.as_str();
        match p.delays.get(&request.schema).copied() {
            None => {
                if let Err(e) = p.bus.publish_webhook(topic, payload).await {
                    warn!(error = %e, "Mock presentation rejected");
                }
            }
            Some(delay) => {
                let bus = Arc::clone(&p.bus);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = bus.publish_webhook(topic, payload).await {
                        warn!(error = %e, "Mock presentation rejected");
                    }
                });
            }
        }
        Ok(())
    }
}

/// In-memory store with injectable save failures.
#[derive(Default)]
pub struct MockRecordStore {
    inner: InMemoryRecordStore,
    reject_attribute: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every save of a record that carries a value for `schema`.
    pub fn reject_attribute(&self, schema: &str) {
        *self.reject_attribute.lock() = Some(schema.to_string());
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn load(&self, id: &RecordId) -> Result<ServiceRecord, StoreError> {
        self.inner.load(id).await
    }

    async fn save(&self, record: &ServiceRecord) -> Result<(), StoreError> {
        let rejected = self.reject_attribute.lock().clone();
        if let Some(schema) = rejected {
            if record.credential_attributes.contains_key(&schema) {
                return Err(StoreError::Backend(format!(
                    "write with '{schema}' rejected"
                )));
            }
        }
        self.inner.save(record).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, schema: Option<&str>) -> Result<Vec<ServiceRecord>, StoreError> {
        self.inner.query(schema).await
    }
}
