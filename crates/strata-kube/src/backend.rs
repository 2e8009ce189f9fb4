//! Kubernetes orchestration backend.
//!
//! Objects are sent as [`DynamicObject`]s addressed by the group, version
//! and plural of their [`ObjectKind`], so the builders never need typed
//! k8s-openapi structs.

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams,
    PostParams,
};
use kube::Client;
use serde_json::Value;
use strata_builder::{InfraObject, ObjectKind, ObjectRef};
use strata_reconcile::{BackendError, BackendResult, ObservedObject, OrchestrationBackend, PatchOutcome};
use tracing::debug;

/// Field manager recorded on every write.
pub const FIELD_MANAGER: &str = "strata-operator";

#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str, kind: ObjectKind) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.kind());
        let ar = ApiResource::from_gvk_with_plural(&gvk, kind.plural());
        Api::namespaced_with(self.client.clone(), namespace, &ar)
    }
}

/// Map an API failure onto the backend taxonomy.
pub fn classify(err: kube::Error, object: &str) -> BackendError {
    match err {
        kube::Error::Api(ae) => match ae.code {
            404 => BackendError::NotFound(object.to_string()),
            409 => BackendError::AlreadyExists(object.to_string()),
            400 | 403 | 422 => BackendError::Rejected(format!("{object}: {}", ae.message)),
            _ => BackendError::Unavailable(format!("{object}: {}", ae.message)),
        },
        other => BackendError::Unavailable(format!("{object}: {other}")),
    }
}

/// Replica counts of a workload; non-workloads report nothing.
pub fn observe(object: &DynamicObject) -> ObservedObject {
    let replicas = object
        .data
        .pointer("/spec/replicas")
        .and_then(Value::as_u64)
        .map(|n| n as u32);
    let ready_replicas = object
        .data
        .pointer("/status/readyReplicas")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    ObservedObject {
        replicas,
        ready_replicas,
    }
}

fn to_dynamic(object: &InfraObject) -> BackendResult<DynamicObject> {
    serde_json::from_value(object.manifest.clone())
        .map_err(|e| BackendError::Rejected(format!("{object}: {e}")))
}

#[async_trait]
impl OrchestrationBackend for KubeBackend {
    async fn create(&self, object: &InfraObject) -> BackendResult<()> {
        let label = object.to_string();
        let body = to_dynamic(object)?;
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api(&object.namespace, object.kind)
            .create(&pp, &body)
            .await
            .map_err(|e| classify(e, &label))?;
        debug!(object = %label, "created");
        Ok(())
    }

    async fn patch(&self, object: &InfraObject) -> BackendResult<PatchOutcome> {
        let label = object.to_string();
        let api = self.api(&object.namespace, object.kind);
        let before = api
            .get(&object.name)
            .await
            .map_err(|e| classify(e, &label))?;
        let after = api
            .patch(
                &object.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&object.manifest),
            )
            .await
            .map_err(|e| classify(e, &label))?;

        // The API server only bumps resourceVersion when something changed.
        if before.metadata.resource_version == after.metadata.resource_version {
            Ok(PatchOutcome::Unchanged)
        } else {
            Ok(PatchOutcome::Patched)
        }
    }

    async fn delete(&self, namespace: &str, object: &ObjectRef) -> BackendResult<()> {
        let label = object.to_string();
        self.api(namespace, object.kind)
            .delete(object.name, &DeleteParams::background())
            .await
            .map_err(|e| classify(e, &label))?;
        debug!(namespace, object = %label, "deleted");
        Ok(())
    }

    async fn get(&self, namespace: &str, object: &ObjectRef) -> BackendResult<Option<ObservedObject>> {
        let label = object.to_string();
        let found = self
            .api(namespace, object.kind)
            .get_opt(object.name)
            .await
            .map_err(|e| classify(e, &label))?;
        Ok(found.as_ref().map(observe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;
    use serde_json::json;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn classifies_api_errors() {
        assert_eq!(
            classify(api_error(404), "Secret/x"),
            BackendError::NotFound("Secret/x".to_string())
        );
        assert_eq!(
            classify(api_error(409), "Secret/x"),
            BackendError::AlreadyExists("Secret/x".to_string())
        );
        assert!(matches!(
            classify(api_error(422), "Secret/x"),
            BackendError::Rejected(_)
        ));
        assert!(matches!(
            classify(api_error(503), "Secret/x"),
            BackendError::Unavailable(_)
        ));
    }

    #[test]
    fn observes_workload_replicas() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": { "name": "safekeeper", "namespace": "neon" },
            "spec": { "replicas": 3 },
            "status": { "readyReplicas": 2 },
        }))
        .unwrap();
        assert_eq!(
            observe(&object),
            ObservedObject {
                replicas: Some(3),
                ready_replicas: 2,
            }
        );
    }

    #[test]
    fn non_workloads_observe_empty() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": "neon-storage-credentials" },
        }))
        .unwrap();
        assert_eq!(observe(&object), ObservedObject::default());
    }
}
