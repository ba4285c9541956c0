//! # Sub-flow Supervisor
//!
//! Every verification sub-flow runs as a task spawned through here. Terminal
//! failures are logged, counted and published as `SubflowFailed` whether or
//! not anyone ever awaits the task's handle. A panicking sub-flow is reported
//! the same way instead of vanishing with its task.

use agent_telemetry::metrics::{SUBFLOWS, SUBFLOW_DURATION};
use agent_telemetry::time_histogram;
use futures::FutureExt;
use shared_bus::{EventPublisher, InMemoryEventBus};
use shared_types::{AgentEvent, RecordId, SubflowFailure};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::{SubflowError, SubflowOutcome};

#[derive(Debug, Default)]
struct SupervisorStats {
    running: AtomicUsize,
    done: AtomicU64,
    failed: AtomicU64,
}

/// Counts a sub-flow as running until its task ends or is aborted.
struct Running(Arc<SupervisorStats>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Supervised task set for verification sub-flows.
#[derive(Clone)]
pub struct SubflowSupervisor {
    bus: Arc<InMemoryEventBus>,
    stats: Arc<SupervisorStats>,
}

impl SubflowSupervisor {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            bus,
            stats: Arc::new(SupervisorStats::default()),
        }
    }

    /// Spawn `flow` for the `schema` sub-flow of `record_id`.
    pub fn spawn<F>(&self, record_id: RecordId, schema: String, flow: F) -> JoinHandle<SubflowOutcome>
    where
        F: Future<Output = Result<String, SubflowError>> + Send + 'static,
    {
        let bus = Arc::clone(&self.bus);
        self.stats.running.fetch_add(1, Ordering::SeqCst);
        let running = Running(Arc::clone(&self.stats));

        tokio::spawn(async move {
            let timer = time_histogram!(SUBFLOW_DURATION);
            let result = match AssertUnwindSafe(flow).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(SubflowError::Aborted(panic_message(panic.as_ref()))),
            };
            let elapsed = timer.elapsed_secs();
            drop(timer);

            let stats = &running.0;
            match &result {
                Ok(value) => {
                    stats.done.fetch_add(1, Ordering::SeqCst);
                    SUBFLOWS.with_label_values(&[schema.as_str(), "done"]).inc();
                    info!(record_id = %record_id, schema = %schema, value = %value, elapsed_secs = elapsed, "Verification sub-flow done");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::SeqCst);
                    SUBFLOWS.with_label_values(&[schema.as_str(), "failed"]).inc();
                    error!(record_id = %record_id, schema = %schema, cause = e.cause(), error = %e, "Verification sub-flow failed");
                    bus.publish(AgentEvent::SubflowFailed(SubflowFailure {
                        record_id,
                        schema: schema.clone(),
                        error: e.to_string(),
                    }))
                    .await;
                }
            }
            drop(running);

            SubflowOutcome {
                record_id,
                schema,
                result,
            }
        })
    }

    /// Sub-flows spawned and not yet finished.
    pub fn running(&self) -> usize {
        self.stats.running.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.stats.done.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::SeqCst)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
