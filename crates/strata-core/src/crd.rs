//! Custom resource definitions watched by the Strata operator.
//!
//! `StrataDeployment` is declared next to its spec in [`crate::spec`];
//! this module adds the tenant and timeline resources handled by the
//! control plane.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::lifecycle::ResourceStatus;

pub use crate::spec::StrataDeployment;

/// Finalizer guarding teardown of every Strata resource.
pub const FINALIZER: &str = "strata.dev/finalizer";

/// A tenant and, optionally, the page server it should live on.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "StrataTenant",
    plural = "stratatenants",
    status = "ResourceStatus",
    namespaced,
    printcolumn = r#"{"name":"Tenant","type":"string","jsonPath":".spec.tenantId"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    pub tenant_id: String,
    /// Page server node id. Changing it moves the tenant and bumps its
    /// generation; removing it detaches the tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pageserver: Option<String>,
}

/// One WAL stream of a tenant.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "StrataTimeline",
    plural = "stratatimelines",
    status = "ResourceStatus",
    namespaced,
    printcolumn = r#"{"name":"Tenant","type":"string","jsonPath":".spec.tenantId"}"#,
    printcolumn = r#"{"name":"Timeline","type":"string","jsonPath":".spec.timelineId"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSpec {
    pub tenant_id: String,
    pub timeline_id: String,
    /// Compute node bound to this timeline; used to answer compute spec
    /// requests from the control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_id: Option<String>,
    #[serde(default = "default_pg_version")]
    pub pg_version: u32,
}

fn default_pg_version() -> u32 {
    16
}
