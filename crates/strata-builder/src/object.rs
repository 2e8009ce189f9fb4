//! Infrastructure object envelope shared by builders and backends.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strata_core::OwnerLink;

/// Kinds of object the builders produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Secret,
    ConfigMap,
    Service,
    Deployment,
    StatefulSet,
}

impl ObjectKind {
    pub fn group(self) -> &'static str {
        match self {
            ObjectKind::Secret | ObjectKind::ConfigMap | ObjectKind::Service => "",
            ObjectKind::Deployment | ObjectKind::StatefulSet => "apps",
        }
    }

    pub fn version(self) -> &'static str {
        "v1"
    }

    pub fn api_version(self) -> &'static str {
        match self.group() {
            "" => "v1",
            _ => "apps/v1",
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            ObjectKind::Secret => "Secret",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::Service => "Service",
            ObjectKind::Deployment => "Deployment",
            ObjectKind::StatefulSet => "StatefulSet",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ObjectKind::Secret => "secrets",
            ObjectKind::ConfigMap => "configmaps",
            ObjectKind::Service => "services",
            ObjectKind::Deployment => "deployments",
            ObjectKind::StatefulSet => "statefulsets",
        }
    }

    /// Whether the object runs pods and reports ready replicas.
    pub fn is_workload(self) -> bool {
        matches!(self, ObjectKind::Deployment | ObjectKind::StatefulSet)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Kind and fixed name of an object a component owns.
///
/// Names never depend on the cluster spec, so teardown can address every object
/// without a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: &'static str,
}

impl ObjectRef {
    pub const fn new(kind: ObjectKind, name: &'static str) -> Self {
        Self { kind, name }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A fully rendered object, ready to hand to the orchestration backend.
#[derive(Debug, Clone, PartialEq)]
pub struct InfraObject {
    pub kind: ObjectKind,
    pub name: String,
    pub namespace: String,
    pub manifest: Value,
}

impl InfraObject {
    /// Build an object labelled `app={app}`. `body` holds the top-level
    /// fields besides `apiVersion`, `kind` and `metadata`.
    pub fn new(kind: ObjectKind, name: &str, namespace: &str, app: &str, body: Value) -> Self {
        let mut manifest = json!({
            "apiVersion": kind.api_version(),
            "kind": kind.kind(),
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": { "app": app },
            },
        });
        if let (Some(target), Value::Object(fields)) = (manifest.as_object_mut(), body) {
            target.extend(fields);
        }
        Self {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
            manifest,
        }
    }

    /// Stamp `owner` into `metadata.ownerReferences`, replacing any
    /// previous owner.
    pub fn with_owner(mut self, owner: &OwnerLink) -> Self {
        self.manifest["metadata"]["ownerReferences"] = json!([owner.owner_reference()]);
        self
    }

    pub fn owner_uid(&self) -> Option<&str> {
        self.manifest["metadata"]["ownerReferences"][0]["uid"].as_str()
    }

    pub fn matches(&self, r: &ObjectRef) -> bool {
        self.kind == r.kind && self.name == r.name
    }
}

impl fmt::Display for InfraObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}
