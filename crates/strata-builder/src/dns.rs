//! In-cluster service addresses.

pub const BROKER_GRPC_PORT: u16 = 50051;
pub const SAFEKEEPER_PG_PORT: u16 = 5454;
pub const SAFEKEEPER_HTTP_PORT: u16 = 7676;
pub const CONTROL_PLANE_PORT: u16 = 1234;
pub const PAGESERVER_HTTP_PORT: u16 = 9898;
pub const PAGESERVER_PG_PORT: u16 = 6400;
pub const COMPUTE_PG_PORT: u16 = 5432;
pub const COMPUTE_HTTP_PORT: u16 = 3080;

/// `{service}.{namespace}.svc.cluster.local`
pub fn service_host(service: &str, namespace: &str) -> String {
    format!("{service}.{namespace}.svc.cluster.local")
}

/// Stable per-pod name behind a headless service.
pub fn pod_host(service: &str, ordinal: &str, namespace: &str) -> String {
    format!("{service}-{ordinal}.{service}.{namespace}.svc.cluster.local")
}

pub fn broker_endpoint(namespace: &str) -> String {
    format!(
        "http://{}:{BROKER_GRPC_PORT}",
        service_host("storage-broker", namespace)
    )
}

pub fn control_plane_api(namespace: &str) -> String {
    format!(
        "http://{}:{CONTROL_PLANE_PORT}",
        service_host("control-plane", namespace)
    )
}

/// Page server pods take their node id from the pod ordinal.
pub fn pageserver_host(node_id: &str, namespace: &str) -> String {
    pod_host("pageserver", node_id, namespace)
}

pub fn pageserver_connstring(node_id: &str, namespace: &str) -> String {
    format!(
        "postgresql://no_user@{}:{PAGESERVER_PG_PORT}",
        pageserver_host(node_id, namespace)
    )
}

pub fn safekeeper_connstrings(replicas: u32, namespace: &str) -> Vec<String> {
    (0..replicas)
        .map(|i| {
            format!(
                "{}:{SAFEKEEPER_PG_PORT}",
                pod_host("safekeeper", &i.to_string(), namespace)
            )
        })
        .collect()
}
