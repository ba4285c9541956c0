//! # Service Records
//!
//! A registered service and the credential attributes that have been verified
//! for it. The attribute map only grows: each verification sub-flow inserts or
//! overwrites the value for its own schema, and nothing removes keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::RecordId;

/// Lifecycle state of a service record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordState {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// A registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    /// Record primary key.
    pub id: RecordId,
    /// DID of the agent that owns the service.
    pub owner_identity: String,
    /// DIDComm schema (protocol) the service speaks.
    pub schema_name: String,
    /// Verified attributes, keyed by credential schema.
    #[serde(default)]
    pub credential_attributes: BTreeMap<String, String>,
    /// Lifecycle state.
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    /// Create a fresh record in the `Created` state with no attributes.
    pub fn new(owner_identity: impl Into<String>, schema_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            owner_identity: owner_identity.into(),
            schema_name: schema_name.into(),
            credential_attributes: BTreeMap::new(),
            state: RecordState::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Insert or overwrite the verified value for one credential schema.
    ///
    /// Moves the record to `Updated`. Returns the previous value, if any.
    pub fn merge_attributes(
        &mut self,
        credential_schema: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        let previous = self
            .credential_attributes
            .insert(credential_schema.into(), value.into());
        self.state = RecordState::Updated;
        self.updated_at = Utc::now();
        previous
    }

    /// Value verified for a credential schema, if present.
    pub fn attribute(&self, credential_schema: &str) -> Option<&str> {
        self.credential_attributes
            .get(credential_schema)
            .map(String::as_str)
    }
}
