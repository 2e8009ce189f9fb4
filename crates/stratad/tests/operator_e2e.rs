//! Operator end-to-end tests against the in-memory backend.
//!
//! Each test runs the same reconciler and dispatcher the operator wires
//! up, only with `MemoryBackend` in place of the cluster API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use strata_builder::ObjectKind;
use strata_core::config::ImagesConfig;
use strata_core::{ClusterSpec, OwnerLink, ResourcePhase};
use strata_reconcile::memory::Verb;
use strata_reconcile::{
    Change, DependencyGraph, Dispatcher, MemoryBackend, ReconcileError, Reconciler,
};

fn owner() -> OwnerLink {
    OwnerLink {
        api_version: "strata.dev/v1alpha1".to_string(),
        kind: "StrataDeployment".to_string(),
        name: "main".to_string(),
        namespace: "neon".to_string(),
        uid: "uid-e2e".to_string(),
    }
}

fn storage_config() -> serde_json::Value {
    json!({
        "credentials": { "awsAccessKeyID": "minio", "awsSecretAccessKey": "password" },
        "endpoint": "http://minio:9000",
        "bucketName": "neon",
        "region": "eu-north-1",
        "prefixInBucket": "/pageserver/"
    })
}

fn spec() -> ClusterSpec {
    serde_json::from_value(json!({ "storageConfig": storage_config() })).unwrap()
}

fn reconciler(backend: &MemoryBackend) -> Reconciler {
    Reconciler::new(
        Arc::new(backend.clone()),
        DependencyGraph::cluster().unwrap(),
        ImagesConfig::default(),
        Duration::from_secs(1),
    )
}

#[tokio::test]
async fn fresh_cluster_comes_up_ready() {
    let backend = MemoryBackend::new();
    let rec = reconciler(&backend);

    let outcome = rec.reconcile(&owner(), &spec()).await.unwrap();
    assert!(outcome.is_ready());
    assert_eq!(outcome.status.phase, ResourcePhase::Ready);
    assert_eq!(backend.calls_of(Verb::Create).len(), 13);

    for (kind, name) in [
        (ObjectKind::Secret, "neon-storage-credentials"),
        (ObjectKind::Deployment, "storage-broker"),
        (ObjectKind::StatefulSet, "safekeeper"),
        (ObjectKind::StatefulSet, "control-plane"),
        (ObjectKind::StatefulSet, "pageserver"),
        (ObjectKind::Deployment, "compute-node"),
    ] {
        assert!(backend.contains("neon", kind, name), "{kind}/{name} missing");
    }

    // Every object carries the owner reference.
    let manifest = backend
        .manifest("neon", ObjectKind::StatefulSet, "pageserver")
        .unwrap();
    assert_eq!(manifest["metadata"]["ownerReferences"][0]["uid"], "uid-e2e");
}

#[tokio::test]
async fn each_missing_storage_field_fails_without_side_effects() {
    for field in ["endpoint", "bucketName", "region", "prefixInBucket", "credentials"] {
        let backend = MemoryBackend::new();
        let rec = reconciler(&backend);

        let mut storage = storage_config();
        storage.as_object_mut().unwrap().remove(field);
        let spec: ClusterSpec =
            serde_json::from_value(json!({ "storageConfig": storage })).unwrap();

        let err = rec.reconcile(&owner(), &spec).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)), "{field}: {err:?}");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains(field), "{field}: {err}");
        assert!(backend.calls().is_empty(), "{field}: backend was called");
    }
}

#[tokio::test]
async fn second_pass_creates_nothing() {
    let backend = MemoryBackend::new();
    let rec = reconciler(&backend);
    rec.reconcile(&owner(), &spec()).await.unwrap();
    backend.reset_calls();

    let outcome = rec.reconcile(&owner(), &spec()).await.unwrap();
    assert!(outcome.is_ready());
    assert!(backend.calls_of(Verb::Create).is_empty());
    assert!(
        outcome
            .changes
            .iter()
            .all(|c| matches!(c, Change::Unchanged(_)))
    );
    assert_eq!(backend.object_count(), 13);
}

#[tokio::test]
async fn rollout_waits_on_each_tier() {
    let backend = MemoryBackend::new();
    let rec = reconciler(&backend);
    backend.set_ready(ObjectKind::Deployment, "storage-broker", false);
    backend.set_ready(ObjectKind::StatefulSet, "pageserver", false);

    let err = rec.reconcile(&owner(), &spec()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::PrerequisiteNotReady {
            component: "safekeeper",
            prerequisite: "storage-broker"
        }
    ));
    assert!(!backend.contains("neon", ObjectKind::StatefulSet, "safekeeper"));
    let status = rec.status(&owner().key());
    assert_eq!(status.phase, ResourcePhase::Creating);
    assert!(status.reason.unwrap().contains("storage-broker"));

    backend.set_ready(ObjectKind::Deployment, "storage-broker", true);
    let err = rec.reconcile(&owner(), &spec()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::PrerequisiteNotReady {
            component: "compute-node",
            prerequisite: "pageserver"
        }
    ));
    assert!(backend.contains("neon", ObjectKind::StatefulSet, "pageserver"));
    assert!(!backend.contains("neon", ObjectKind::Deployment, "compute-node"));

    backend.set_ready(ObjectKind::StatefulSet, "pageserver", true);
    let outcome = rec.reconcile(&owner(), &spec()).await.unwrap();
    assert!(outcome.is_ready());
    assert_eq!(backend.object_count(), 13);
}

#[tokio::test]
async fn delete_tears_down_in_reverse_order() {
    let backend = MemoryBackend::new();
    let rec = reconciler(&backend);
    rec.reconcile(&owner(), &spec()).await.unwrap();
    let mut creates = backend.calls_of(Verb::Create);
    backend.reset_calls();

    let outcome = rec.delete(&owner()).await.unwrap();
    assert_eq!(outcome.status.phase, ResourcePhase::Absent);
    creates.reverse();
    assert_eq!(backend.calls_of(Verb::Delete), creates);
    assert_eq!(backend.object_count(), 0);

    // Deleting again is a no-op.
    rec.delete(&owner()).await.unwrap();
    assert_eq!(backend.object_count(), 0);
}

#[tokio::test]
async fn dispatcher_orders_apply_before_delete() {
    let backend = MemoryBackend::new();
    backend.set_latency(Duration::from_millis(5));
    let rec = Arc::new(reconciler(&backend));
    let dispatcher = Dispatcher::new();
    let key = owner().key();

    let apply = {
        let (rec, dispatcher, key) = (rec.clone(), dispatcher.clone(), key.clone());
        tokio::spawn(async move {
            dispatcher
                .run(&key, || async { rec.reconcile(&owner(), &spec()).await })
                .await
        })
    };
    // Let the apply take the key first.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let delete = {
        let (rec, dispatcher, key) = (rec.clone(), dispatcher.clone(), key.clone());
        tokio::spawn(async move {
            dispatcher
                .run(&key, || async { rec.delete(&owner()).await })
                .await
        })
    };

    apply.await.unwrap().unwrap();
    delete.await.unwrap().unwrap();

    assert_eq!(backend.object_count(), 0);
    assert_eq!(rec.status(&key).phase, ResourcePhase::Absent);
    let calls = backend.calls();
    let last_create = calls.iter().rposition(|c| c.verb == Verb::Create).unwrap();
    let first_delete = calls.iter().position(|c| c.verb == Verb::Delete).unwrap();
    assert!(last_create < first_delete);
}
