//! # Agent Runtime
//!
//! Runs the protocol bridge beside an external agent process.
//!
//! - **stdin**: webhooks and peer messages forwarded by the agent
//! - **stdout**: outbound messages and proof requests, one JSON line each
//! - **stderr**: logs
//!
//! ## Startup Sequence
//!
//! 1. Load and validate configuration from the environment
//! 2. Initialize logging and metrics
//! 3. Wire the container over the stdout outbox
//! 4. Start handlers and the stdin ingress
//! 5. Run until Ctrl+C or until the agent closes stdin

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{debug, info};

use agent_runtime::adapters::JsonLineOutbox;
use agent_runtime::{AgentConfig, AgentContainer, AgentRuntime, Transports};
use agent_telemetry::{encode_metrics, init_telemetry};
use service_registry::InMemoryRecordStore;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run());

    // A pending stdin read parks a blocking thread that never returns
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run() -> Result<()> {
    let config = AgentConfig::from_env();
    config.validate().context("Invalid configuration")?;

    let _telemetry = init_telemetry(&config.telemetry).context("Failed to initialize telemetry")?;

    let outbox = Arc::new(JsonLineOutbox::new(tokio::io::stdout()));
    let transports = Transports {
        messages: outbox.clone(),
        proofs: outbox,
        records: Arc::new(InMemoryRecordStore::new()),
    };

    let runtime = AgentRuntime::new(AgentContainer::new(config, transports));
    runtime.start();
    let mut ingress = runtime.spawn_ingress(BufReader::new(tokio::io::stdin()));

    info!("Agent runtime is running. Press Ctrl+C to stop.");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received");
        }
        stats = &mut ingress => {
            let stats = stats.context("Ingress task failed")?;
            info!(
                accepted = stats.accepted,
                dispatched = stats.dispatched,
                rejected = stats.rejected,
                "Agent closed its output"
            );
        }
    }

    runtime.shutdown().await;

    if let Ok(text) = encode_metrics() {
        debug!("Final metrics:\n{}", text);
    }
    Ok(())
}
