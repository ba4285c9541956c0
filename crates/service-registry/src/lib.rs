//! # service-registry
//!
//! Service registration gated by concurrent credential verification.
//!
//! ## Role in System
//!
//! - **Registration**: a remote agent announces a service; the record is
//!   persisted in `CREATED` and announced on `registered_service`
//! - **Verification**: one proof request per attribute group, all in flight
//!   at once; each completed presentation fills one key of the record
//! - **Supervision**: failed sub-flows surface on `subflow_failed` even when
//!   nobody awaits them
//!
//! ## Sub-flow Choreography
//!
//! ```text
//! [Orchestrator] ──spawn──→ [car-registration] ──proof request──→ [Prover]
//!        │                                                           │
//!        └──spawn──→ [car-type] ──proof request──→ [Prover]          │
//!                        │                            │              │
//!                        │         present_proof_done (by exchange id)
//!                        ↓                            ↓              ↓
//!                  merge + save ←──────────── [Event Bus] ───────────┘
//!                        │
//!                registered_service (UPDATED)
//! ```
//!
//! Each sub-flow writes a distinct key, and whole-record saves are serialized
//! per record, so concurrent completions never lose each other's values.

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod supervisor;

pub use config::{ParseStrategyError, PublishStrategy, RegistryConfig};
pub use domain::{
    join_sorted, merge_presentation, AttributeGroup, AttributeSpec, ProofRequest, RegistryError,
    Restriction, StoreError, SubflowError, SubflowOutcome, SubflowState, VerificationSubflow,
    CAR_REGISTRATION_SCHEMA, CAR_TYPE_SCHEMA, DEFAULT_TRUSTED_ISSUER, IDENTITY_SCHEMA,
};
pub use ports::{
    presentation_webhook, InMemoryRecordStore, MockProofRequester, MockRecordStore, Presenter,
    ProofRequester, RecordStore, ServiceRegistryApi,
};
pub use service::{Registration, VerificationOrchestrator};
pub use supervisor::SubflowSupervisor;
