//! Inbound ports (API) for the service registry.

use async_trait::async_trait;
use shared_types::{ConnectionId, ServiceRecord};

use crate::domain::RegistryError;
use crate::service::Registration;

/// Service registration gated by credential verification.
#[async_trait]
pub trait ServiceRegistryApi: Send + Sync {
    /// Register `schema` for the agent behind `destination` and verify its
    /// credentials.
    ///
    /// Under the incremental strategy this returns as soon as the `Created`
    /// record is persisted; under join-all it returns the merged record.
    async fn register_service_with_verification(
        &self,
        destination: &ConnectionId,
        owner_identity: &str,
        schema: &str,
    ) -> Result<Registration, RegistryError>;

    /// Stored services, optionally filtered by schema.
    async fn list_services(&self, schema: Option<&str>) -> Result<Vec<ServiceRecord>, RegistryError>;

    /// Sub-flows that ended in `FAILED` since start-up.
    fn failed_subflows(&self) -> u64;
}
