//! In-memory orchestration backend.
//!
//! Keeps objects in a map, records every call, and lets tests inject
//! failures, latency and readiness. `stratad operator --dry-run` also runs
//! against it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use strata_builder::{InfraObject, ObjectKind, ObjectRef};
use tracing::debug;

use crate::backend::{BackendError, BackendResult, ObservedObject, OrchestrationBackend, PatchOutcome};

/// Backend verb, used for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Patch,
    Delete,
    Get,
}

/// One recorded call: verb and `Kind/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub verb: Verb,
    pub object: String,
}

type Key = (String, ObjectKind, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Value>,
    calls: Vec<BackendCall>,
    failures: HashMap<(Verb, String), BackendError>,
    not_ready: HashSet<String>,
    latency: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

fn label(kind: ObjectKind, name: &str) -> String {
    format!("{kind}/{name}")
}

impl MemoryBackend {
    /// Workloads report all desired replicas ready unless held back with
    /// [`MemoryBackend::set_ready`].
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every `verb` call on `Kind/name` fail with `error` until cleared.
    pub fn fail(&self, verb: Verb, object: &str, error: BackendError) {
        self.lock().failures.insert((verb, object.to_string()), error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Hold a workload at zero ready replicas, or release it.
    pub fn set_ready(&self, kind: ObjectKind, name: &str, ready: bool) {
        let mut inner = self.lock();
        let key = label(kind, name);
        if ready {
            inner.not_ready.remove(&key);
        } else {
            inner.not_ready.insert(key);
        }
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Objects touched by `verb`, in call order.
    pub fn calls_of(&self, verb: Verb) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.verb == verb)
            .map(|c| c.object.clone())
            .collect()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn contains(&self, namespace: &str, kind: ObjectKind, name: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(namespace.to_string(), kind, name.to_string()))
    }

    pub fn manifest(&self, namespace: &str, kind: ObjectKind, name: &str) -> Option<Value> {
        self.lock()
            .objects
            .get(&(namespace.to_string(), kind, name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Insert an object directly, bypassing the call log.
    pub fn seed(&self, object: &InfraObject) {
        self.lock().objects.insert(
            (object.namespace.clone(), object.kind, object.name.clone()),
            object.manifest.clone(),
        );
    }

    /// Record the call, apply latency, and return any injected failure.
    async fn enter(&self, verb: Verb, kind: ObjectKind, name: &str) -> BackendResult<()> {
        let object = label(kind, name);
        let (latency, failure) = {
            let mut inner = self.lock();
            inner.calls.push(BackendCall {
                verb,
                object: object.clone(),
            });
            (inner.latency, inner.failures.get(&(verb, object)).cloned())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OrchestrationBackend for MemoryBackend {
    async fn create(&self, object: &InfraObject) -> BackendResult<()> {
        self.enter(Verb::Create, object.kind, &object.name).await?;
        let key = (object.namespace.clone(), object.kind, object.name.clone());
        let mut inner = self.lock();
        if inner.objects.contains_key(&key) {
            return Err(BackendError::AlreadyExists(label(object.kind, &object.name)));
        }
        inner.objects.insert(key, object.manifest.clone());
        debug!(object = %object, "memory backend: created");
        Ok(())
    }

    async fn patch(&self, object: &InfraObject) -> BackendResult<PatchOutcome> {
        self.enter(Verb::Patch, object.kind, &object.name).await?;
        let key = (object.namespace.clone(), object.kind, object.name.clone());
        let mut inner = self.lock();
        match inner.objects.get_mut(&key) {
            Some(current) if *current == object.manifest => Ok(PatchOutcome::Unchanged),
            Some(current) => {
                *current = object.manifest.clone();
                debug!(object = %object, "memory backend: patched");
                Ok(PatchOutcome::Patched)
            }
            None => Err(BackendError::NotFound(label(object.kind, &object.name))),
        }
    }

    async fn delete(&self, namespace: &str, object: &ObjectRef) -> BackendResult<()> {
        self.enter(Verb::Delete, object.kind, object.name).await?;
        let key = (namespace.to_string(), object.kind, object.name.to_string());
        match self.lock().objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound(object.to_string())),
        }
    }

    async fn get(
        &self,
        namespace: &str,
        object: &ObjectRef,
    ) -> BackendResult<Option<ObservedObject>> {
        self.enter(Verb::Get, object.kind, object.name).await?;
        let key = (namespace.to_string(), object.kind, object.name.to_string());
        let inner = self.lock();
        let Some(manifest) = inner.objects.get(&key) else {
            return Ok(None);
        };
        if !object.kind.is_workload() {
            return Ok(Some(ObservedObject::default()));
        }
        let replicas = manifest["spec"]["replicas"].as_u64().unwrap_or(1) as u32;
        let ready_replicas = if inner.not_ready.contains(&object.to_string()) {
            0
        } else {
            replicas
        };
        Ok(Some(ObservedObject {
            replicas: Some(replicas),
            ready_replicas,
        }))
    }
}
