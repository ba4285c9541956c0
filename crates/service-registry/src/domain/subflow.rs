//! # Verification Sub-flows
//!
//! One credential-verification round trip within a registration.
//!
//! ```text
//! REQUESTED ──proof request sent──→ WAITING ──presentation merged──→ DONE
//!     │                                │
//!     └──────────send error────────────┴──────────any failure──────→ FAILED
//! ```

use shared_types::{ExchangeId, RecordId};
use std::fmt;

use crate::domain::attribute_group::AttributeGroup;
use crate::domain::errors::{RegistryError, SubflowError};

/// Sub-flow lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubflowState {
    Requested,
    Waiting,
    Done,
    Failed,
}

impl SubflowState {
    pub fn can_transition_to(self, next: SubflowState) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Waiting)
                | (Self::Requested, Self::Failed)
                | (Self::Waiting, Self::Done)
                | (Self::Waiting, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for SubflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "REQUESTED",
            Self::Waiting => "WAITING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A single verification round trip for one attribute group.
#[derive(Debug, Clone)]
pub struct VerificationSubflow {
    record_id: RecordId,
    exchange_id: ExchangeId,
    group: AttributeGroup,
    state: SubflowState,
}

impl VerificationSubflow {
    /// A sub-flow in `REQUESTED` with a fresh exchange id.
    pub fn new(record_id: RecordId, group: AttributeGroup) -> Self {
        Self {
            record_id,
            exchange_id: ExchangeId::new(),
            group,
            state: SubflowState::Requested,
        }
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn exchange_id(&self) -> ExchangeId {
        self.exchange_id
    }

    pub fn group(&self) -> &AttributeGroup {
        &self.group
    }

    pub fn schema(&self) -> &str {
        &self.group.schema
    }

    pub fn state(&self) -> SubflowState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// `RegistryError::InvalidTransition` if the state machine has no such edge.
    pub fn advance(&mut self, next: SubflowState) -> Result<(), RegistryError> {
        if !self.state.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Terminal result of one sub-flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubflowOutcome {
    pub record_id: RecordId,
    pub schema: String,
    /// The merged attribute value, or why the sub-flow failed.
    pub result: Result<String, SubflowError>,
}

impl SubflowOutcome {
    pub fn is_done(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }
}
