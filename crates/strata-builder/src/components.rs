//! Manifests for each cluster component.
//!
//! Every builder returns the component's objects in creation order. The
//! object names are fixed and mirrored by the `*_OBJECTS` tables so that
//! teardown and readiness checks can address them without a config.

use serde_json::{Value, json};
use strata_core::ClusterConfig;
use strata_core::types::ResourceRequirements;

use crate::compute_spec::empty_compute_spec;
use crate::dns::{self, *};
use crate::error::{BuildError, BuildResult};
use crate::object::{InfraObject, ObjectKind, ObjectRef};

pub const STORAGE_CREDENTIALS: &str = "storage-credentials";
pub const STORAGE_BROKER: &str = "storage-broker";
pub const SAFEKEEPER: &str = "safekeeper";
pub const CONTROL_PLANE: &str = "control-plane";
pub const PAGESERVER: &str = "pageserver";
pub const COMPUTE_NODE: &str = "compute-node";

pub const CREDENTIALS_SECRET: &str = "neon-storage-credentials";
pub const PAGESERVER_CONFIG: &str = "pageserver";
pub const COMPUTE_CONFIG: &str = "compute-node-config";

/// Where the control plane keeps its attachment store. Backed by a
/// per-pod volume claim so generations survive restarts.
pub const CONTROL_PLANE_DATA_DIR: &str = "/var/lib/strata";
const CONTROL_PLANE_DATA_VOLUME: &str = "control-plane-data-volume";

pub const STORAGE_CREDENTIALS_OBJECTS: &[ObjectRef] =
    &[ObjectRef::new(ObjectKind::Secret, CREDENTIALS_SECRET)];

pub const STORAGE_BROKER_OBJECTS: &[ObjectRef] = &[
    ObjectRef::new(ObjectKind::Deployment, STORAGE_BROKER),
    ObjectRef::new(ObjectKind::Service, STORAGE_BROKER),
];

pub const SAFEKEEPER_OBJECTS: &[ObjectRef] = &[
    ObjectRef::new(ObjectKind::StatefulSet, SAFEKEEPER),
    ObjectRef::new(ObjectKind::Service, SAFEKEEPER),
];

pub const CONTROL_PLANE_OBJECTS: &[ObjectRef] = &[
    ObjectRef::new(ObjectKind::StatefulSet, CONTROL_PLANE),
    ObjectRef::new(ObjectKind::Service, CONTROL_PLANE),
];

pub const PAGESERVER_OBJECTS: &[ObjectRef] = &[
    ObjectRef::new(ObjectKind::ConfigMap, PAGESERVER_CONFIG),
    ObjectRef::new(ObjectKind::StatefulSet, PAGESERVER),
    ObjectRef::new(ObjectKind::Service, PAGESERVER),
];

pub const COMPUTE_NODE_OBJECTS: &[ObjectRef] = &[
    ObjectRef::new(ObjectKind::ConfigMap, COMPUTE_CONFIG),
    ObjectRef::new(ObjectKind::Deployment, COMPUTE_NODE),
    ObjectRef::new(ObjectKind::Service, COMPUTE_NODE),
];

// ── Shared fragments ───────────────────────────────────────────────

fn resources(r: &ResourceRequirements) -> Value {
    json!({ "requests": r.requests, "limits": r.limits })
}

fn secret_env(key: &str) -> Value {
    json!({
        "name": key,
        "valueFrom": { "secretKeyRef": { "name": CREDENTIALS_SECRET, "key": key } },
    })
}

/// Env var carrying the StatefulSet pod ordinal.
fn pod_index_env(name: &str) -> Value {
    json!({
        "name": name,
        "valueFrom": {
            "fieldRef": { "fieldPath": "metadata.labels['apps.kubernetes.io/pod-index']" }
        },
    })
}

fn http_probe(path: &str, port: u16) -> Value {
    json!({
        "httpGet": { "path": path, "port": port },
        "initialDelaySeconds": 5,
        "periodSeconds": 5,
    })
}

fn port(name: &str, port: u16) -> Value {
    json!({ "name": name, "port": port, "targetPort": port })
}

/// A Service selecting `app={app}`. Headless services give each
/// StatefulSet pod a stable DNS name.
fn service(namespace: &str, app: &str, ports: Vec<Value>, headless: bool) -> InfraObject {
    let mut spec = json!({ "selector": { "app": app }, "ports": ports });
    if headless {
        spec["clusterIP"] = json!("None");
    }
    InfraObject::new(ObjectKind::Service, app, namespace, app, json!({ "spec": spec }))
}

fn pod_template(app: &str, containers: Vec<Value>, volumes: Vec<Value>) -> Value {
    let mut spec = json!({ "containers": containers });
    if !volumes.is_empty() {
        spec["volumes"] = json!(volumes);
    }
    json!({ "metadata": { "labels": { "app": app } }, "spec": spec })
}

fn render_json(what: &'static str, value: &impl serde::Serialize) -> BuildResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| BuildError::Render {
        what,
        reason: e.to_string(),
    })
}

// ── Builders ───────────────────────────────────────────────────────

pub fn storage_credentials(cfg: &ClusterConfig) -> BuildResult<Vec<InfraObject>> {
    Ok(vec![InfraObject::new(
        ObjectKind::Secret,
        CREDENTIALS_SECRET,
        &cfg.namespace,
        STORAGE_CREDENTIALS,
        json!({
            "type": "Opaque",
            "stringData": {
                "AWS_ACCESS_KEY_ID": cfg.credentials.access_key_id,
                "AWS_SECRET_ACCESS_KEY": cfg.credentials.secret_access_key,
            },
        }),
    )])
}

pub fn storage_broker(cfg: &ClusterConfig) -> BuildResult<Vec<InfraObject>> {
    let s = &cfg.storage_broker;
    let container = json!({
        "name": STORAGE_BROKER,
        "image": s.image,
        "imagePullPolicy": s.image_pull_policy,
        "command": ["storage_broker", format!("--listen-addr=0.0.0.0:{BROKER_GRPC_PORT}")],
        "ports": [{ "name": "grpc", "containerPort": BROKER_GRPC_PORT }],
        "resources": resources(&s.resources),
    });
    let deployment = InfraObject::new(
        ObjectKind::Deployment,
        STORAGE_BROKER,
        &cfg.namespace,
        STORAGE_BROKER,
        json!({
            "spec": {
                "replicas": s.replicas,
                "selector": { "matchLabels": { "app": STORAGE_BROKER } },
                "template": pod_template(STORAGE_BROKER, vec![container], vec![]),
            }
        }),
    );
    Ok(vec![
        deployment,
        service(
            &cfg.namespace,
            STORAGE_BROKER,
            vec![port("grpc", BROKER_GRPC_PORT)],
            false,
        ),
    ])
}

pub fn safekeeper(cfg: &ClusterConfig) -> BuildResult<Vec<InfraObject>> {
    let s = &cfg.safekeeper;
    let store = &cfg.object_store;
    let remote_storage = format!(
        "{{endpoint='{}',bucket_name='{}',bucket_region='{}',prefix_in_bucket='{}'}}",
        store.endpoint, store.bucket, store.region, store.prefix
    );
    let container = json!({
        "name": SAFEKEEPER,
        "image": s.image,
        "imagePullPolicy": s.image_pull_policy,
        "command": [
            "safekeeper",
            format!("--listen-pg=0.0.0.0:{SAFEKEEPER_PG_PORT}"),
            format!("--listen-http=0.0.0.0:{SAFEKEEPER_HTTP_PORT}"),
            "--id=$(SAFEKEEPER_ID)",
            format!("--broker-endpoint={}", dns::broker_endpoint(&cfg.namespace)),
            "-D",
            "/data",
            format!("--remote-storage={remote_storage}"),
        ],
        "env": [
            pod_index_env("SAFEKEEPER_ID"),
            secret_env("AWS_ACCESS_KEY_ID"),
            secret_env("AWS_SECRET_ACCESS_KEY"),
        ],
        "ports": [
            { "name": "wal", "containerPort": SAFEKEEPER_PG_PORT },
            { "name": "http", "containerPort": SAFEKEEPER_HTTP_PORT },
        ],
        "readinessProbe": http_probe("/v1/status", SAFEKEEPER_HTTP_PORT),
        "resources": resources(&s.resources),
    });
    let statefulset = InfraObject::new(
        ObjectKind::StatefulSet,
        SAFEKEEPER,
        &cfg.namespace,
        SAFEKEEPER,
        json!({
            "spec": {
                "replicas": s.replicas,
                "serviceName": SAFEKEEPER,
                "selector": { "matchLabels": { "app": SAFEKEEPER } },
                "template": pod_template(SAFEKEEPER, vec![container], vec![]),
            }
        }),
    );
    Ok(vec![
        statefulset,
        service(
            &cfg.namespace,
            SAFEKEEPER,
            vec![
                port("wal", SAFEKEEPER_PG_PORT),
                port("http", SAFEKEEPER_HTTP_PORT),
            ],
            true,
        ),
    ])
}

/// The generation authority. Always one pod: a StatefulSet replaces it
/// only after the old pod is gone, so two authorities never run at once.
pub fn control_plane(cfg: &ClusterConfig) -> BuildResult<Vec<InfraObject>> {
    let s = &cfg.control_plane;
    let container = json!({
        "name": CONTROL_PLANE,
        "image": s.image,
        "imagePullPolicy": s.image_pull_policy,
        "command": [
            "stratad",
            "control-plane",
            "--port",
            CONTROL_PLANE_PORT.to_string(),
            "--data-dir",
            CONTROL_PLANE_DATA_DIR,
            "--safekeepers",
            cfg.safekeeper.replicas.to_string(),
        ],
        "env": [{
            "name": "NAMESPACE",
            "valueFrom": { "fieldRef": { "fieldPath": "metadata.namespace" } },
        }],
        "ports": [{ "name": "http", "containerPort": CONTROL_PLANE_PORT }],
        "readinessProbe": http_probe("/", CONTROL_PLANE_PORT),
        "volumeMounts": [
            { "name": CONTROL_PLANE_DATA_VOLUME, "mountPath": CONTROL_PLANE_DATA_DIR },
        ],
        "resources": resources(&s.resources),
    });
    let statefulset = InfraObject::new(
        ObjectKind::StatefulSet,
        CONTROL_PLANE,
        &cfg.namespace,
        CONTROL_PLANE,
        json!({
            "spec": {
                "replicas": 1,
                "serviceName": CONTROL_PLANE,
                "selector": { "matchLabels": { "app": CONTROL_PLANE } },
                "template": pod_template(CONTROL_PLANE, vec![container], vec![]),
                "volumeClaimTemplates": [{
                    "metadata": {
                        "name": CONTROL_PLANE_DATA_VOLUME,
                        "labels": { "app": CONTROL_PLANE },
                    },
                    "spec": {
                        "accessModes": ["ReadWriteOnce"],
                        "resources": { "requests": { "storage": s.storage_capacity } },
                    },
                }],
            }
        }),
    );
    Ok(vec![
        statefulset,
        service(
            &cfg.namespace,
            CONTROL_PLANE,
            vec![port("http", CONTROL_PLANE_PORT)],
            true,
        ),
    ])
}

/// `pageserver.toml` with listen addresses, control plane and remote
/// storage.
pub fn pageserver_toml(cfg: &ClusterConfig) -> String {
    let store = &cfg.object_store;
    let mut remote = toml::Table::new();
    remote.insert("endpoint".into(), store.endpoint.clone().into());
    remote.insert("bucket_name".into(), store.bucket.clone().into());
    remote.insert("bucket_region".into(), store.region.clone().into());
    remote.insert("prefix_in_bucket".into(), store.prefix.clone().into());

    let mut root = toml::Table::new();
    root.insert(
        "listen_pg_addr".into(),
        format!("0.0.0.0:{PAGESERVER_PG_PORT}").into(),
    );
    root.insert(
        "listen_http_addr".into(),
        format!("0.0.0.0:{PAGESERVER_HTTP_PORT}").into(),
    );
    root.insert(
        "control_plane_api".into(),
        dns::control_plane_api(&cfg.namespace).into(),
    );
    root.insert(
        "broker_endpoint".into(),
        dns::broker_endpoint(&cfg.namespace).into(),
    );
    root.insert("http_auth_type".into(), "Trust".into());
    root.insert("pg_auth_type".into(), "Trust".into());
    root.insert("remote_storage".into(), toml::Value::Table(remote));
    root.to_string()
}

pub fn pageserver(cfg: &ClusterConfig) -> BuildResult<Vec<InfraObject>> {
    let s = &cfg.pageserver;
    let configmap = InfraObject::new(
        ObjectKind::ConfigMap,
        PAGESERVER_CONFIG,
        &cfg.namespace,
        PAGESERVER,
        json!({ "data": { "pageserver.toml": pageserver_toml(cfg) } }),
    );
    let container = json!({
        "name": PAGESERVER,
        "image": s.image,
        "imagePullPolicy": s.image_pull_policy,
        "command": ["pageserver", "-D", "/data/.neon/", "-c", "id=$(POD_INDEX)"],
        "env": [
            pod_index_env("POD_INDEX"),
            { "name": "BROKER_ENDPOINT", "value": dns::broker_endpoint(&cfg.namespace) },
            secret_env("AWS_ACCESS_KEY_ID"),
            secret_env("AWS_SECRET_ACCESS_KEY"),
        ],
        "ports": [
            { "name": "http", "containerPort": PAGESERVER_HTTP_PORT },
            { "name": "pg", "containerPort": PAGESERVER_PG_PORT },
        ],
        "readinessProbe": http_probe("/v1/status", PAGESERVER_HTTP_PORT),
        "volumeMounts": [
            { "name": "pageserver-data-volume", "mountPath": "/data/.neon/" },
            {
                "name": "pageserver-config-volume",
                "mountPath": "/data/.neon/pageserver.toml",
                "subPath": "pageserver.toml",
            },
        ],
        "resources": resources(&s.resources),
    });
    let volumes = vec![json!({
        "name": "pageserver-config-volume",
        "configMap": {
            "name": PAGESERVER_CONFIG,
            "items": [{ "key": "pageserver.toml", "path": "pageserver.toml" }],
        },
    })];
    let statefulset = InfraObject::new(
        ObjectKind::StatefulSet,
        PAGESERVER,
        &cfg.namespace,
        PAGESERVER,
        json!({
            "spec": {
                "replicas": s.replicas,
                "serviceName": PAGESERVER,
                "selector": { "matchLabels": { "app": PAGESERVER } },
                "template": pod_template(PAGESERVER, vec![container], volumes),
                "volumeClaimTemplates": [{
                    "metadata": {
                        "name": "pageserver-data-volume",
                        "labels": { "app": PAGESERVER },
                    },
                    "spec": {
                        "accessModes": ["ReadWriteOnce"],
                        "resources": { "requests": { "storage": s.storage_capacity } },
                    },
                }],
            }
        }),
    );
    Ok(vec![
        configmap,
        statefulset,
        service(
            &cfg.namespace,
            PAGESERVER,
            vec![
                port("http", PAGESERVER_HTTP_PORT),
                port("pg", PAGESERVER_PG_PORT),
            ],
            true,
        ),
    ])
}

pub fn compute_node(cfg: &ClusterConfig) -> BuildResult<Vec<InfraObject>> {
    let s = &cfg.compute_node;
    let spec = empty_compute_spec(&cfg.namespace, cfg.safekeeper.replicas);
    let configmap = InfraObject::new(
        ObjectKind::ConfigMap,
        COMPUTE_CONFIG,
        &cfg.namespace,
        COMPUTE_NODE,
        json!({ "data": { "spec.json": render_json("compute spec", &spec)? } }),
    );

    let extensions = json!({
        "bucket": cfg.object_store.bucket,
        "region": cfg.object_store.region,
    })
    .to_string();
    let container = json!({
        "name": COMPUTE_NODE,
        "image": s.image,
        "imagePullPolicy": s.image_pull_policy,
        "command": [
            "compute_ctl",
            "-D", "/var/db/postgres/compute",
            "-C", format!("postgresql://cloud_admin@0.0.0.0:{COMPUTE_PG_PORT}/postgres"),
            "-b", "/usr/local/bin/postgres",
            "-r", extensions,
            "--spec-path", "/var/compute/config/spec.json",
        ],
        "ports": [
            { "name": "pg", "containerPort": COMPUTE_PG_PORT },
            { "name": "http", "containerPort": COMPUTE_HTTP_PORT },
        ],
        "volumeMounts": [
            { "name": "compute-node-data-volume", "mountPath": "/var/db/postgres" },
            { "name": "compute-node-config-volume", "mountPath": "/var/compute/config" },
        ],
        "resources": resources(&s.resources),
    });
    let volumes = vec![
        json!({ "name": "compute-node-data-volume", "emptyDir": {} }),
        json!({ "name": "compute-node-config-volume", "configMap": { "name": COMPUTE_CONFIG } }),
    ];
    let deployment = InfraObject::new(
        ObjectKind::Deployment,
        COMPUTE_NODE,
        &cfg.namespace,
        COMPUTE_NODE,
        json!({
            "spec": {
                "replicas": s.replicas,
                "selector": { "matchLabels": { "app": COMPUTE_NODE } },
                "template": pod_template(COMPUTE_NODE, vec![container], volumes),
            }
        }),
    );
    Ok(vec![
        configmap,
        deployment,
        service(
            &cfg.namespace,
            COMPUTE_NODE,
            vec![port("pg", COMPUTE_PG_PORT), port("http", COMPUTE_HTTP_PORT)],
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::config::ImagesConfig;
    use strata_core::spec::ClusterSpec;

    fn config() -> ClusterConfig {
        let spec: ClusterSpec = serde_json::from_value(json!({
            "storageConfig": {
                "credentials": { "awsAccessKeyID": "minio", "awsSecretAccessKey": "secret" },
                "endpoint": "http://minio:9000",
                "bucketName": "neon",
                "region": "eu-north-1",
                "prefixInBucket": "/pageserver/"
            }
        }))
        .unwrap();
        spec.validate("neon", &ImagesConfig::default()).unwrap()
    }

    fn refs(objects: &[InfraObject]) -> Vec<(ObjectKind, String)> {
        objects.iter().map(|o| (o.kind, o.name.clone())).collect()
    }

    fn table(table: &[ObjectRef]) -> Vec<(ObjectKind, String)> {
        table.iter().map(|r| (r.kind, r.name.to_string())).collect()
    }

    #[test]
    fn builders_match_their_object_tables() {
        let cfg = config();
        let cases: [(BuildResult<Vec<InfraObject>>, &[ObjectRef]); 6] = [
            (storage_credentials(&cfg), STORAGE_CREDENTIALS_OBJECTS),
            (storage_broker(&cfg), STORAGE_BROKER_OBJECTS),
            (safekeeper(&cfg), SAFEKEEPER_OBJECTS),
            (control_plane(&cfg), CONTROL_PLANE_OBJECTS),
            (pageserver(&cfg), PAGESERVER_OBJECTS),
            (compute_node(&cfg), COMPUTE_NODE_OBJECTS),
        ];
        for (built, expected) in cases {
            let built = built.unwrap();
            assert_eq!(refs(&built), table(expected));
            for obj in &built {
                assert_eq!(obj.namespace, "neon");
                assert_eq!(obj.manifest["metadata"]["namespace"], "neon");
            }
        }
    }

    #[test]
    fn builders_are_deterministic() {
        let cfg = config();
        assert_eq!(pageserver(&cfg).unwrap(), pageserver(&cfg).unwrap());
        assert_eq!(compute_node(&cfg).unwrap(), compute_node(&cfg).unwrap());
    }

    #[test]
    fn secret_carries_credentials() {
        let objs = storage_credentials(&config()).unwrap();
        let data = &objs[0].manifest["stringData"];
        assert_eq!(data["AWS_ACCESS_KEY_ID"], "minio");
        assert_eq!(data["AWS_SECRET_ACCESS_KEY"], "secret");
    }

    #[test]
    fn safekeeper_points_at_broker_and_bucket() {
        let objs = safekeeper(&config()).unwrap();
        let command = objs[0].manifest["spec"]["template"]["spec"]["containers"][0]["command"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        assert!(command.contains("--broker-endpoint=http://storage-broker.neon.svc.cluster.local:50051"));
        assert!(command.contains("bucket_name='neon'"));
        assert_eq!(objs[0].manifest["spec"]["replicas"], 3);
        assert_eq!(objs[1].manifest["spec"]["clusterIP"], "None");
    }

    #[test]
    fn pageserver_toml_parses_back() {
        let rendered = pageserver_toml(&config());
        let parsed: toml::Table = rendered.parse().unwrap();
        assert_eq!(parsed["listen_http_addr"].as_str(), Some("0.0.0.0:9898"));
        assert_eq!(
            parsed["control_plane_api"].as_str(),
            Some("http://control-plane.neon.svc.cluster.local:1234")
        );
        assert_eq!(parsed["remote_storage"]["bucket_region"].as_str(), Some("eu-north-1"));
    }

    #[test]
    fn pageserver_claims_configured_capacity() {
        let objs = pageserver(&config()).unwrap();
        let claim = &objs[1].manifest["spec"]["volumeClaimTemplates"][0];
        assert_eq!(claim["spec"]["resources"]["requests"]["storage"], "1Gi");
    }

    #[test]
    fn control_plane_store_lives_on_a_claim() {
        let objs = control_plane(&config()).unwrap();
        let sts = &objs[0].manifest["spec"];
        assert_eq!(objs[0].kind, ObjectKind::StatefulSet);
        assert_eq!(sts["replicas"], 1);

        let claim = &sts["volumeClaimTemplates"][0];
        assert_eq!(claim["metadata"]["name"], "control-plane-data-volume");
        assert_eq!(claim["spec"]["resources"]["requests"]["storage"], "1Gi");

        let container = &sts["template"]["spec"]["containers"][0];
        assert_eq!(
            container["volumeMounts"][0],
            json!({ "name": "control-plane-data-volume", "mountPath": "/var/lib/strata" })
        );
        let command: Vec<&str> = container["command"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        let at = command.iter().position(|a| *a == "--data-dir").unwrap();
        assert_eq!(command[at + 1], "/var/lib/strata");
    }

    #[test]
    fn compute_config_holds_rendered_spec() {
        let objs = compute_node(&config()).unwrap();
        let raw = objs[0].manifest["data"]["spec.json"].as_str().unwrap();
        let spec: strata_core::compute::ComputeSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.safekeeper_connstrings.len(), 3);
    }

    #[test]
    fn default_resources_applied() {
        let objs = storage_broker(&config()).unwrap();
        let res = &objs[0].manifest["spec"]["template"]["spec"]["containers"][0]["resources"];
        assert_eq!(res["requests"]["cpu"], "100m");
        assert_eq!(res["limits"]["memory"], "200Mi");
    }
}
