//! Compute spec document served to compute nodes on bootstrap.
//!
//! The shape follows what `compute_ctl` expects from
//! `GET /compute/api/v2/computes/{compute_id}/spec`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericOption {
    pub name: String,
    pub value: Option<String>,
    pub vartype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub encrypted_password: Option<String>,
    pub replication: Option<bool>,
    pub bypassrls: Option<bool>,
    #[serde(default)]
    pub options: Vec<GenericOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub options: Vec<GenericOption>,
    pub restrict_conn: bool,
    pub invalid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub roles: Vec<Role>,
    pub databases: Vec<Database>,
    pub postgresql_conf: Option<String>,
    pub settings: Vec<GenericOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaOperation {
    pub action: String,
    pub name: String,
    pub new_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionData {
    pub control_data: std::collections::BTreeMap<String, String>,
    pub archive_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteExtensionSpec {
    pub public_extensions: Option<Vec<String>>,
    pub custom_extensions: Option<Vec<String>>,
    pub library_index: std::collections::BTreeMap<String, String>,
    pub extension_data: std::collections::BTreeMap<String, ExtensionData>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeMode {
    #[default]
    Primary,
    Replica,
    Static,
}

/// Full bootstrap configuration for one compute node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeSpec {
    pub format_version: f64,
    pub operation_uuid: String,
    pub cluster: Cluster,
    pub delta_operations: Vec<DeltaOperation>,
    pub skip_pg_catalog_updates: bool,
    pub tenant_id: String,
    pub timeline_id: String,
    pub pageserver_connstring: String,
    pub safekeeper_connstrings: Vec<String>,
    pub mode: ComputeMode,
    pub storage_auth_token: String,
    pub remote_extensions: Vec<RemoteExtensionSpec>,
}

/// Whether the compute id is bound to a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeStatus {
    Empty,
    Attached,
}

/// Response body of the compute spec endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneSpecResponse {
    pub spec: ComputeSpec,
    pub status: ComputeStatus,
}
