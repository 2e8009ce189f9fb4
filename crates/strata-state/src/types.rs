//! Persisted records.

use serde::{Deserialize, Serialize};
use strata_core::{Generation, NodeId, TenantId, TimelineId};

/// Which storage node serves a tenant, and under which generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub tenant_id: TenantId,
    /// `None` while the tenant is detached.
    pub node_id: Option<NodeId>,
    /// Never decremented. Zero until the first attach.
    pub generation: Generation,
    /// Unix timestamp (seconds) of the last mutation.
    pub updated_at: u64,
}

impl AttachmentRecord {
    pub fn new(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            node_id: None,
            generation: 0,
            updated_at: now_secs(),
        }
    }

    pub fn is_attached_to(&self, node_id: &str) -> bool {
        self.node_id.as_deref() == Some(node_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineRecord {
    pub tenant_id: TenantId,
    pub timeline_id: TimelineId,
    pub compute_id: Option<String>,
    pub pg_version: u32,
    pub created_at: u64,
}

impl TimelineRecord {
    pub fn key(&self) -> (&str, &str) {
        (&self.tenant_id, &self.timeline_id)
    }
}

/// Human-readable form of a timeline key, for logs and errors.
pub fn timeline_label(tenant_id: &str, timeline_id: &str) -> String {
    format!("{tenant_id}/{timeline_id}")
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
