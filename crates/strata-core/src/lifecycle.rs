//! Lifecycle of a managed resource.
//!
//! ```text
//! Absent ─────▶ Creating ─────▶ Ready
//! Ready ──────▶ Updating ─────▶ Ready
//! Ready|Updating ─▶ Deleting ─▶ Absent
//! Creating|Updating|Deleting ─▶ Degraded ─▶ (pending step)
//! ```
//!
//! Any active step may drop into `Degraded` on a retryable error; the next
//! reconciliation re-enters the step that was pending. The only way back to
//! `Absent` is through `Deleting`.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum ResourcePhase {
    #[default]
    Absent,
    Creating,
    Ready,
    Updating,
    Deleting,
    Degraded,
}

/// The operation a reconciliation pass is carrying out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Phase a resource sits in while this operation runs.
    pub fn active_phase(self) -> ResourcePhase {
        match self {
            Operation::Create => ResourcePhase::Creating,
            Operation::Update => ResourcePhase::Updating,
            Operation::Delete => ResourcePhase::Deleting,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal phase transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ResourcePhase,
    pub to: ResourcePhase,
}

impl ResourcePhase {
    /// Whether the lifecycle allows moving from `self` to `to`.
    ///
    /// Staying in the same phase is always allowed (a repeated event for
    /// an in-flight step).
    pub fn can_transition(self, to: ResourcePhase) -> bool {
        use ResourcePhase::*;
        if self == to {
            return true;
        }
        match (self, to) {
            (Absent, Creating) => true,
            (Creating, Ready) | (Creating, Degraded) => true,
            (Ready, Updating) | (Ready, Deleting) => true,
            (Updating, Ready) | (Updating, Deleting) | (Updating, Degraded) => true,
            (Deleting, Absent) | (Deleting, Degraded) => true,
            (Degraded, Creating) | (Degraded, Updating) | (Degraded, Deleting) => true,
            // A resource that never got past creation can still be torn down.
            (Creating, Deleting) => true,
            _ => false,
        }
    }

    pub fn transition(self, to: ResourcePhase) -> Result<ResourcePhase, InvalidTransition> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

/// Status written back to a custom resource after each reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub phase: ResourcePhase,
    /// Human-readable explanation for a non-ready phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Operation to resume when the phase is `Degraded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_operation: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ResourceStatus {
    /// The operation a level-triggered reconcile should run next.
    ///
    /// `Deleting` (and a degraded delete) are driven by deletion events,
    /// so they map to `Delete` here only for completeness.
    pub fn next_operation(&self) -> Operation {
        match self.phase {
            ResourcePhase::Absent | ResourcePhase::Creating => Operation::Create,
            ResourcePhase::Ready | ResourcePhase::Updating => Operation::Update,
            ResourcePhase::Deleting => Operation::Delete,
            ResourcePhase::Degraded => self.pending_operation.unwrap_or(Operation::Create),
        }
    }
}
