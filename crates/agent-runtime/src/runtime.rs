//! # Agent Runtime
//!
//! Owns the container and the background tasks around it.
//!
//! ## Startup Sequence
//!
//! 1. Build the container (bus, bridge, registry)
//! 2. Attach the bus metrics sink
//! 3. Start the ingress over the agent's output stream, with the protocol
//!    handler attached
//!
//! ## Shutdown Sequence
//!
//! 1. Signal every task to stop
//! 2. Close the bus; pending waiters observe `Closed`
//! 3. Join the tasks

use crate::adapters::{IngressStats, WebhookIngress};
use crate::container::AgentContainer;
use crate::handlers::MetricsSink;
use parking_lot::Mutex;
use request_bridge::{OutboundRequestBridge, RequestBridgeApi};
use service_registry::VerificationOrchestrator;
use shared_bus::InMemoryEventBus;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The running agent bridge.
pub struct AgentRuntime {
    container: Arc<AgentContainer>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentRuntime {
    pub fn new(container: AgentContainer) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            container: Arc::new(container),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the background handlers.
    pub fn start(&self) {
        info!(
            service = %self.container.config.telemetry.service_name,
            "Starting agent runtime"
        );

        let sink = MetricsSink::new(Arc::clone(&self.container.bus));
        let shutdown = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            sink.run(shutdown).await;
        });
        self.tasks.lock().push(handle);

        info!("Agent runtime started");
    }

    /// Feed webhook lines from `reader` onto the bus and peer messages to the
    /// protocol handler.
    ///
    /// The returned handle completes when the reader reaches EOF or the
    /// runtime shuts down.
    pub fn spawn_ingress<R>(&self, reader: R) -> JoinHandle<IngressStats>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let ingress = WebhookIngress::new(Arc::clone(&self.container.bus))
            .with_protocol(Arc::clone(&self.container.protocol));
        let shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move { ingress.run(reader, shutdown).await })
    }

    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.container.bus)
    }

    pub fn bridge(&self) -> Arc<OutboundRequestBridge> {
        Arc::clone(&self.container.bridge)
    }

    pub fn registry(&self) -> Arc<VerificationOrchestrator> {
        Arc::clone(&self.container.registry)
    }

    pub fn container(&self) -> Arc<AgentContainer> {
        Arc::clone(&self.container)
    }

    /// Stop every task and close the bus.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        self.container.bus.shutdown();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        let bridge = self.container.bridge.stats();
        info!(
            sent = bridge.sent,
            completed = bridge.completed,
            timeouts = bridge.timeouts,
            failed_subflows = self.container.registry.supervisor().failed(),
            "Shutdown complete"
        );
    }
}
