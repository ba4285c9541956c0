//! Ports for the service registry.

pub mod inbound;
pub mod outbound;

pub use inbound::ServiceRegistryApi;
pub use outbound::{
    presentation_webhook, InMemoryRecordStore, MockProofRequester, MockRecordStore, Presenter,
    ProofRequester, RecordStore,
};
