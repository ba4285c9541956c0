//! # Component Container
//!
//! Builds every component around one shared event bus.
//!
//! ## Dependency Order
//!
//! 1. Event bus (no dependencies)
//! 2. Request bridge (bus + message transport)
//! 3. Verification orchestrator (bus + proof transport + record store)
//! 4. Protocol handler (bridge + orchestrator)

pub mod config;

pub use config::{AgentConfig, ConfigError, ProtocolConfig};

use crate::handlers::ProtocolHandler;
use request_bridge::{MessageSender, OutboundRequestBridge};
use service_registry::{ProofRequester, RecordStore, VerificationOrchestrator};
use shared_bus::InMemoryEventBus;
use std::sync::Arc;
use tracing::info;

/// External capabilities the runtime is wired against.
pub struct Transports {
    pub messages: Arc<dyn MessageSender>,
    pub proofs: Arc<dyn ProofRequester>,
    pub records: Arc<dyn RecordStore>,
}

/// Every initialized component.
pub struct AgentContainer {
    pub config: AgentConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub bridge: Arc<OutboundRequestBridge>,
    pub registry: Arc<VerificationOrchestrator>,
    pub protocol: Arc<ProtocolHandler>,
}

impl AgentContainer {
    pub fn new(config: AgentConfig, transports: Transports) -> Self {
        let bus = Arc::new(InMemoryEventBus::new());
        info!("[bus] Event bus created");

        let bridge = Arc::new(OutboundRequestBridge::new(
            Arc::clone(&bus),
            transports.messages,
            config.bridge.clone(),
        ));
        info!(deadlines = ?config.bridge, "[bridge] Request bridge ready");

        let registry = Arc::new(VerificationOrchestrator::new(
            Arc::clone(&bus),
            transports.proofs,
            transports.records,
            config.registry.clone(),
        ));
        info!(
            strategy = %config.registry.strategy,
            issuer = %config.registry.trusted_issuer_did,
            "[registry] Verification orchestrator ready"
        );

        let protocol = Arc::new(ProtocolHandler::new(
            Arc::clone(&bridge),
            Arc::clone(&registry),
            config.protocol.clone(),
        ));
        info!(
            manifest = %config.protocol.manifest_path.display(),
            "[protocol] Inbound protocol handler ready"
        );

        Self {
            config,
            bus,
            bridge,
            registry,
            protocol,
        }
    }
}
