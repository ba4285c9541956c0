//! Domain layer for the service registry.

pub mod attribute_group;
pub mod errors;
pub mod merge;
pub mod subflow;

pub use attribute_group::{
    AttributeGroup, AttributeSpec, ProofRequest, Restriction, CAR_REGISTRATION_SCHEMA,
    CAR_TYPE_SCHEMA, DEFAULT_TRUSTED_ISSUER, IDENTITY_SCHEMA,
};
pub use errors::{RegistryError, StoreError, SubflowError};
pub use merge::{join_sorted, merge_presentation, VALUE_SEPARATOR};
pub use subflow::{SubflowOutcome, SubflowState, VerificationSubflow};
