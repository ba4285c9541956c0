//! # Bus Metrics Sink
//!
//! Observes every event on the bus through a tap and feeds the bus counters.
//! The tap never resolves a subscription, so the sink is invisible to
//! waiters.

use agent_telemetry::metrics::{BUS_EVENTS_PUBLISHED, BUS_WAITERS_RESOLVED};
use shared_bus::{EventStream, InMemoryEventBus, TopicMatcher};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Counts published events per topic and resolved waiters.
pub struct MetricsSink {
    bus: Arc<InMemoryEventBus>,
    events: EventStream,
    resolved_seen: u64,
}

impl MetricsSink {
    /// Attach to the bus. Events published before this call are not counted.
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        let events = bus.tap(TopicMatcher::all());
        let resolved_seen = bus.subscriptions_resolved();
        Self {
            bus,
            events,
            resolved_seen,
        }
    }

    /// Run until shutdown or until the bus drops the tap.
    ///
    /// Returns the number of events observed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut observed = 0u64;
        info!("[metrics] Bus metrics sink started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[metrics] Shutdown signal received");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => {
                        let topic = event.topic();
                        BUS_EVENTS_PUBLISHED
                            .with_label_values(&[topic.as_str()])
                            .inc();
                        self.sync_resolved();
                        observed += 1;
                        debug!(%topic, "[metrics] Event observed");
                    }
                    None => break,
                },
            }
        }

        self.sync_resolved();
        info!(observed, "[metrics] Bus metrics sink stopped");
        observed
    }

    fn sync_resolved(&mut self) {
        let total = self.bus.subscriptions_resolved();
        if total > self.resolved_seen {
            BUS_WAITERS_RESOLVED.inc_by((total - self.resolved_seen) as f64);
            self.resolved_seen = total;
        }
    }
}
