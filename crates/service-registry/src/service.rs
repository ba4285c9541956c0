//! # Verification Orchestrator
//!
//! Gates service registration behind concurrent credential verification.
//!
//! ## Flow
//!
//! 1. Persist and announce the `Created` record
//! 2. Spawn one supervised sub-flow per attribute group, all at once
//! 3. Each sub-flow opens a waiter keyed by its exchange id, sends the proof
//!    request, waits for the presentation and merges the revealed values
//! 4. Publish, per [`PublishStrategy`]:
//!    - `Incremental`: each sub-flow persists and announces its own update
//!    - `JoinAll`: the initiator joins every sub-flow and persists once
//!
//! A failed sub-flow never cancels or blocks its siblings.

use agent_telemetry::metrics::REGISTRATIONS;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use shared_bus::{by_exchange_id, EventPublisher, EventSubscriber, InMemoryEventBus, TopicMatcher, WaitError};
use shared_types::{AgentEvent, ConnectionId, RecordId, ServiceRecord, Topic};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{PublishStrategy, RegistryConfig};
use crate::domain::{
    merge_presentation, AttributeGroup, ProofRequest, RegistryError, StoreError, SubflowError,
    SubflowOutcome, SubflowState, VerificationSubflow,
};
use crate::ports::inbound::ServiceRegistryApi;
use crate::ports::outbound::{ProofRequester, RecordStore};
use crate::supervisor::SubflowSupervisor;

// =============================================================================
// Registration handle
// =============================================================================

enum Subflows {
    Running(Vec<(String, JoinHandle<SubflowOutcome>)>),
    Finished(Vec<SubflowOutcome>),
}

/// A registration in progress (incremental) or completed (join-all).
///
/// Dropping the handle does not stop running sub-flows.
pub struct Registration {
    record: ServiceRecord,
    strategy: PublishStrategy,
    subflows: Subflows,
}

impl Registration {
    /// The record as of the moment the registration call returned.
    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    pub fn record_id(&self) -> RecordId {
        self.record.id
    }

    pub fn strategy(&self) -> PublishStrategy {
        self.strategy
    }

    /// Wait for every sub-flow to reach a terminal state.
    pub async fn join(self) -> Vec<SubflowOutcome> {
        let record_id = self.record.id;
        match self.subflows {
            Subflows::Finished(outcomes) => outcomes,
            Subflows::Running(handles) => join_handles(record_id, handles).await,
        }
    }
}

async fn join_handles(
    record_id: RecordId,
    handles: Vec<(String, JoinHandle<SubflowOutcome>)>,
) -> Vec<SubflowOutcome> {
    let (schemas, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    join_all(handles)
        .await
        .into_iter()
        .zip(schemas)
        .map(|(joined, schema)| {
            joined.unwrap_or_else(|e| SubflowOutcome {
                record_id,
                schema,
                result: Err(SubflowError::Aborted(e.to_string())),
            })
        })
        .collect()
}

// =============================================================================
// Sub-flow execution
// =============================================================================

/// Everything a spawned sub-flow needs, cheap to clone into the task.
#[derive(Clone)]
struct SubflowContext {
    bus: Arc<InMemoryEventBus>,
    requester: Arc<dyn ProofRequester>,
    store: Arc<dyn RecordStore>,
    record_locks: Arc<DashMap<RecordId, Arc<Mutex<()>>>>,
    deadline: Duration,
}

impl SubflowContext {
    /// Run one sub-flow to a terminal state.
    ///
    /// With `persist` the merged value is written to the record and announced
    /// before the sub-flow counts as done.
    async fn drive(
        self,
        mut subflow: VerificationSubflow,
        destination: ConnectionId,
        persist: bool,
    ) -> Result<String, SubflowError> {
        let result = match self.verify(&mut subflow, &destination).await {
            Ok(value) if persist => self
                .persist(subflow.record_id(), subflow.schema(), &value)
                .await
                .map(|()| value),
            other => other,
        };

        match &result {
            Ok(_) => subflow.advance(SubflowState::Done)?,
            Err(_) if !subflow.state().is_terminal() => subflow.advance(SubflowState::Failed)?,
            Err(_) => {}
        }
        debug!(
            record_id = %subflow.record_id(),
            schema = subflow.schema(),
            state = %subflow.state(),
            "Sub-flow finished"
        );
        result
    }

    async fn verify(
        &self,
        subflow: &mut VerificationSubflow,
        destination: &ConnectionId,
    ) -> Result<String, SubflowError> {
        let exchange_id = subflow.exchange_id();
        let waiter = self.bus.open(
            TopicMatcher::exact(Topic::PresentationDone),
            by_exchange_id(exchange_id),
        );

        let request = ProofRequest::for_group(subflow.group());
        self.requester
            .request_proof(destination, exchange_id, &request)
            .await?;
        subflow.advance(SubflowState::Waiting)?;
        debug!(schema = subflow.schema(), exchange_id = %exchange_id, "Proof requested");

        let event = waiter.wait(self.deadline).await.map_err(|e| match e {
            WaitError::TimedOut { after } => SubflowError::TimedOut { after },
            WaitError::Closed => SubflowError::Closed,
        })?;

        match event {
            AgentEvent::PresentationDone(presentation) => {
                merge_presentation(subflow.group(), &presentation)
            }
            other => Err(SubflowError::UnexpectedEvent {
                topic: other.topic(),
            }),
        }
    }

    /// Serialized load, merge, save and announce for one record.
    async fn persist(&self, record_id: RecordId, schema: &str, value: &str) -> Result<(), SubflowError> {
        let lock = Arc::clone(self.record_locks.entry(record_id).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.merge_into(record_id, [(schema, value)]).await
        };
        drop(lock);
        self.record_locks
            .remove_if(&record_id, |_, l| Arc::strong_count(l) == 1);
        result.map(|_| ()).map_err(SubflowError::from)
    }

    async fn merge_into<'a, I>(&self, record_id: RecordId, values: I) -> Result<ServiceRecord, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = self.store.load(&record_id).await?;
        for (schema, value) in values {
            record.merge_attributes(schema, value);
        }
        self.store.save(&record).await?;
        info!(
            record_id = %record.id,
            attributes = record.credential_attributes.len(),
            "Service record updated"
        );
        self.bus
            .publish(AgentEvent::ServiceRecord(record.clone()))
            .await;
        Ok(record)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Verification orchestrator over the shared bus, a proof transport and a
/// record store.
pub struct VerificationOrchestrator {
    ctx: SubflowContext,
    supervisor: SubflowSupervisor,
    config: RegistryConfig,
}

impl VerificationOrchestrator {
    pub fn new(
        bus: Arc<InMemoryEventBus>,
        requester: Arc<dyn ProofRequester>,
        store: Arc<dyn RecordStore>,
        config: RegistryConfig,
    ) -> Self {
        let supervisor = SubflowSupervisor::new(Arc::clone(&bus));
        Self {
            ctx: SubflowContext {
                bus,
                requester,
                store,
                record_locks: Arc::new(DashMap::new()),
                deadline: config.verification_deadline,
            },
            supervisor,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &SubflowSupervisor {
        &self.supervisor
    }

    /// Register under the configured groups and strategy.
    pub async fn register(
        &self,
        destination: &ConnectionId,
        owner_identity: &str,
        schema: &str,
    ) -> Result<Registration, RegistryError> {
        self.register_with(
            destination,
            owner_identity,
            schema,
            self.config.attribute_groups(),
            self.config.strategy,
        )
        .await
    }

    /// Register with explicit attribute groups and strategy.
    ///
    /// # Errors
    ///
    /// - `NoAttributeGroups` if `groups` is empty
    /// - `Store` if the initial record (or, for join-all, the merged record)
    ///   cannot be persisted
    pub async fn register_with(
        &self,
        destination: &ConnectionId,
        owner_identity: &str,
        schema: &str,
        groups: Vec<AttributeGroup>,
        strategy: PublishStrategy,
    ) -> Result<Registration, RegistryError> {
        if groups.is_empty() {
            return Err(RegistryError::NoAttributeGroups);
        }

        let record = ServiceRecord::new(owner_identity, schema);
        self.ctx.store.save(&record).await?;
        info!(
            record_id = %record.id,
            owner = owner_identity,
            schema,
            %strategy,
            subflows = groups.len(),
            "Service registered, verifying credentials"
        );
        self.ctx
            .bus
            .publish(AgentEvent::ServiceRecord(record.clone()))
            .await;
        REGISTRATIONS.with_label_values(&[strategy.as_str()]).inc();

        let persist = strategy == PublishStrategy::Incremental;
        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let subflow = VerificationSubflow::new(record.id, group);
                let schema = subflow.schema().to_string();
                let flow = self.ctx.clone().drive(subflow, destination.clone(), persist);
                let handle = self.supervisor.spawn(record.id, schema.clone(), flow);
                (schema, handle)
            })
            .collect();

        match strategy {
            PublishStrategy::Incremental => Ok(Registration {
                record,
                strategy,
                subflows: Subflows::Running(handles),
            }),
            PublishStrategy::JoinAll => {
                let outcomes = join_handles(record.id, handles).await;
                let record = self.publish_joined(record, &outcomes).await?;
                Ok(Registration {
                    record,
                    strategy,
                    subflows: Subflows::Finished(outcomes),
                })
            }
        }
    }

    /// Merge every successful outcome into the record and persist once.
    async fn publish_joined(
        &self,
        record: ServiceRecord,
        outcomes: &[SubflowOutcome],
    ) -> Result<ServiceRecord, RegistryError> {
        let mut values: Vec<(&str, &str)> = outcomes
            .iter()
            .filter_map(|o| o.value().map(|v| (o.schema.as_str(), v)))
            .collect();
        let failed = outcomes.len() - values.len();
        if failed > 0 {
            warn!(record_id = %record.id, failed, "Skipping failed sub-flows");
        }
        if values.is_empty() {
            return Ok(record);
        }
        values.sort_unstable();
        Ok(self.ctx.merge_into(record.id, values).await?)
    }

    pub async fn list_services(&self, schema: Option<&str>) -> Result<Vec<ServiceRecord>, RegistryError> {
        Ok(self.ctx.store.query(schema).await?)
    }

    /// Verify the holder behind `destination` against one group, with no
    /// service record involved. Returns the joined revealed values.
    ///
    /// Waits in the caller's task; nothing is persisted or announced.
    pub async fn verify_holder(
        &self,
        destination: &ConnectionId,
        group: AttributeGroup,
    ) -> Result<String, SubflowError> {
        let mut subflow = VerificationSubflow::new(RecordId::new(), group);
        let result = self.ctx.verify(&mut subflow, destination).await;
        if let Err(e) = &result {
            warn!(
                %destination,
                schema = subflow.schema(),
                cause = e.cause(),
                error = %e,
                "Holder verification failed"
            );
        }
        result
    }
}

#[async_trait]
impl ServiceRegistryApi for VerificationOrchestrator {
    async fn register_service_with_verification(
        &self,
        destination: &ConnectionId,
        owner_identity: &str,
        schema: &str,
    ) -> Result<Registration, RegistryError> {
        self.register(destination, owner_identity, schema).await
    }

    async fn list_services(&self, schema: Option<&str>) -> Result<Vec<ServiceRecord>, RegistryError> {
        VerificationOrchestrator::list_services(self, schema).await
    }

    fn failed_subflows(&self) -> u64 {
        self.supervisor.failed()
    }
}
