//! Identifiers and small value types shared across Strata crates.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Opaque tenant identifier.
pub type TenantId = String;

/// Timeline identifier, unique within a tenant.
pub type TimelineId = String;

/// Storage node (page server) identifier.
pub type NodeId = String;

/// Per-tenant fencing token. Zero means "never attached".
pub type Generation = u32;

/// Back-reference from an infrastructure object to the custom resource
/// that caused its creation.
///
/// The link carries no lifecycle authority over the owner; the
/// orchestration platform uses it to cascade deletes to children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerLink {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

impl OwnerLink {
    /// Key identifying the owning resource: `{kind}/{namespace}/{name}`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.kind, self.namespace, self.name)
    }

    /// Render the link as a Kubernetes `ownerReferences` entry.
    pub fn owner_reference(&self) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": self.api_version,
            "kind": self.kind,
            "name": self.name,
            "uid": self.uid,
            "controller": true,
            "blockOwnerDeletion": true,
        })
    }
}

/// CPU/memory requests and limits for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        let quantities: BTreeMap<String, String> = [
            ("cpu".to_string(), "100m".to_string()),
            ("memory".to_string(), "200Mi".to_string()),
        ]
        .into_iter()
        .collect();
        Self {
            requests: quantities.clone(),
            limits: quantities,
        }
    }
}
