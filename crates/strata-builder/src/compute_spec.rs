//! Compute spec documents handed to `compute_ctl`.

use strata_core::compute::{Cluster, ComputeMode, ComputeSpec};

use crate::dns;

pub const FORMAT_VERSION: f64 = 1.0;

/// Spec for a compute node that is not bound to any timeline yet.
pub fn empty_compute_spec(namespace: &str, safekeepers: u32) -> ComputeSpec {
    ComputeSpec {
        format_version: FORMAT_VERSION,
        operation_uuid: String::new(),
        cluster: Cluster::default(),
        delta_operations: Vec::new(),
        skip_pg_catalog_updates: false,
        tenant_id: String::new(),
        timeline_id: String::new(),
        pageserver_connstring: String::new(),
        safekeeper_connstrings: dns::safekeeper_connstrings(safekeepers, namespace),
        mode: ComputeMode::Primary,
        storage_auth_token: String::new(),
        remote_extensions: Vec::new(),
    }
}

/// Spec for a compute node serving `tenant_id`/`timeline_id`.
///
/// The page server connection string is left empty while the tenant is
/// detached; the compute retries its spec fetch until it is filled in.
pub fn attached_compute_spec(
    namespace: &str,
    safekeepers: u32,
    compute_id: &str,
    tenant_id: &str,
    timeline_id: &str,
    pageserver_node: Option<&str>,
) -> ComputeSpec {
    let mut spec = empty_compute_spec(namespace, safekeepers);
    spec.cluster.cluster_id = Some(compute_id.to_string());
    spec.cluster.name = Some(compute_id.to_string());
    spec.tenant_id = tenant_id.to_string();
    spec.timeline_id = timeline_id.to_string();
    spec.pageserver_connstring = pageserver_node
        .map(|node| dns::pageserver_connstring(node, namespace))
        .unwrap_or_default();
    spec
}
