//! Reconciliation controller — drives infrastructure toward a cluster spec.
//!
//! Every entry point is idempotent: "already exists" on create and "not
//! found" on delete count as success, and patches that change nothing are
//! reported as unchanged. Events for one resource must be serialized by the
//! caller (see [`crate::dispatch::Dispatcher`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use strata_builder::InfraObject;
use strata_core::config::ImagesConfig;
use strata_core::{ClusterConfig, ClusterSpec, Operation, OwnerLink, ResourcePhase, ResourceStatus};
use tracing::{debug, info, warn};

use crate::backend::{BackendError, OrchestrationBackend, PatchOutcome, with_timeout};
use crate::error::{ReconcileError, ReconcileResult};
use crate::graph::{ComponentDescriptor, DependencyGraph};

/// What happened to one object during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Created(String),
    AlreadyExisted(String),
    Patched(String),
    Unchanged(String),
    Deleted(String),
    AlreadyGone(String),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Created(o) => write!(f, "created {o}"),
            Change::AlreadyExisted(o) => write!(f, "{o} already exists"),
            Change::Patched(o) => write!(f, "patched {o}"),
            Change::Unchanged(o) => write!(f, "{o} unchanged"),
            Change::Deleted(o) => write!(f, "deleted {o}"),
            Change::AlreadyGone(o) => write!(f, "{o} already gone"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub operation: Operation,
    pub changes: Vec<Change>,
    pub status: ResourceStatus,
}

impl ReconcileOutcome {
    pub fn is_ready(&self) -> bool {
        self.status.phase == ResourcePhase::Ready
    }
}

pub struct Reconciler {
    backend: Arc<dyn OrchestrationBackend>,
    graph: DependencyGraph,
    images: ImagesConfig,
    call_timeout: Duration,
    statuses: Mutex<HashMap<String, ResourceStatus>>,
}

impl Reconciler {
    pub fn new(
        backend: Arc<dyn OrchestrationBackend>,
        graph: DependencyGraph,
        images: ImagesConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            graph,
            images,
            call_timeout,
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    // ── Status bookkeeping ─────────────────────────────────────────

    /// Last known status of the resource identified by `key`.
    pub fn status(&self, key: &str) -> ResourceStatus {
        let statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.get(key).cloned().unwrap_or_default()
    }

    /// Seed the status of a resource this process has not seen yet, for
    /// example from the status persisted on the custom resource.
    pub fn restore_status(&self, key: &str, status: ResourceStatus) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.entry(key.to_string()).or_insert(status);
    }

    fn set_status(&self, key: &str, status: ResourceStatus) -> ResourceStatus {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.insert(key.to_string(), status.clone());
        status
    }

    /// Drop all bookkeeping for a resource that is gone.
    pub fn forget(&self, key: &str) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.remove(key);
    }

    /// Move `key` into the active phase for `op`.
    fn begin(&self, key: &str, op: Operation, target: ResourcePhase) -> ReconcileResult<()> {
        let mut current = self.status(key);
        current.phase = current.phase.transition(target)?;
        current.pending_operation = Some(op);
        current.reason = None;
        self.set_status(key, current);
        Ok(())
    }

    /// Record the result of a pass and hand it back to the caller.
    fn finish(
        &self,
        key: &str,
        op: Operation,
        changes: Vec<Change>,
        result: ReconcileResult<Option<&'static str>>,
    ) -> ReconcileResult<ReconcileOutcome> {
        let mut status = self.status(key);
        match result {
            Ok(None) => {
                let done = match op {
                    Operation::Delete => ResourcePhase::Absent,
                    Operation::Create | Operation::Update => ResourcePhase::Ready,
                };
                status.phase = status.phase.transition(done)?;
                status.reason = None;
                status.pending_operation = None;
                info!(resource = %key, operation = %op, changes = changes.len(), phase = ?status.phase, "reconcile finished");
                let status = if status.phase == ResourcePhase::Absent {
                    self.forget(key);
                    status
                } else {
                    self.set_status(key, status)
                };
                Ok(ReconcileOutcome {
                    operation: op,
                    changes,
                    status,
                })
            }
            Ok(Some(waiting)) => {
                status.reason = Some(format!("waiting for {waiting} to become ready"));
                debug!(resource = %key, component = waiting, "walk complete, component not ready");
                let status = self.set_status(key, status);
                Ok(ReconcileOutcome {
                    operation: op,
                    changes,
                    status,
                })
            }
            Err(err @ ReconcileError::PrerequisiteNotReady { .. }) => {
                // Expected while dependencies start; stay in the active phase.
                status.reason = Some(err.to_string());
                debug!(resource = %key, reason = %err, "prerequisite not ready");
                self.set_status(key, status);
                Err(err)
            }
            Err(err) => {
                if status.phase.can_transition(ResourcePhase::Degraded) {
                    status.phase = ResourcePhase::Degraded;
                }
                status.pending_operation = Some(op);
                status.reason = Some(err.to_string());
                warn!(resource = %key, operation = %op, error = %err, "reconcile failed");
                self.set_status(key, status);
                Err(err)
            }
        }
    }

    fn validate(&self, owner: &OwnerLink, spec: &ClusterSpec) -> ReconcileResult<ClusterConfig> {
        spec.validate(&owner.namespace, &self.images).map_err(|err| {
            let key = owner.key();
            let mut status = self.status(&key);
            status.reason = Some(format!("invalid cluster spec: {err}"));
            warn!(resource = %key, error = %err, "rejecting cluster spec");
            self.set_status(&key, status);
            ReconcileError::Config(err)
        })
    }

    // ── Entry points ───────────────────────────────────────────────

    /// Create every component in dependency order.
    ///
    /// Applying a resource that is already ready re-runs the same walk
    /// under `Updating`; existing objects are left as they are.
    pub async fn apply(
        &self,
        owner: &OwnerLink,
        spec: &ClusterSpec,
    ) -> ReconcileResult<ReconcileOutcome> {
        let cfg = self.validate(owner, spec)?;
        let key = owner.key();
        let target = match self.status(&key).phase {
            ResourcePhase::Ready | ResourcePhase::Updating => ResourcePhase::Updating,
            _ => ResourcePhase::Creating,
        };
        self.begin(&key, Operation::Create, target)?;
        info!(resource = %key, "apply");

        let mut changes = Vec::new();
        let result = self
            .walk(Operation::Create, owner, &cfg, &mut changes)
            .await;
        self.finish(&key, Operation::Create, changes, result)
    }

    /// Patch every component in dependency order, creating what is missing.
    pub async fn update(
        &self,
        owner: &OwnerLink,
        spec: &ClusterSpec,
    ) -> ReconcileResult<ReconcileOutcome> {
        let cfg = self.validate(owner, spec)?;
        let key = owner.key();
        self.begin(&key, Operation::Update, ResourcePhase::Updating)?;
        info!(resource = %key, "update");

        let mut changes = Vec::new();
        let result = self
            .walk(Operation::Update, owner, &cfg, &mut changes)
            .await;
        self.finish(&key, Operation::Update, changes, result)
    }

    /// Delete every component in reverse dependency order.
    ///
    /// Needs no spec. Every object is attempted even when earlier deletes
    /// fail; failures are reported together at the end.
    pub async fn delete(&self, owner: &OwnerLink) -> ReconcileResult<ReconcileOutcome> {
        let key = owner.key();
        if self.status(&key).phase != ResourcePhase::Absent {
            self.begin(&key, Operation::Delete, ResourcePhase::Deleting)?;
        }
        info!(resource = %key, "delete");

        let mut changes = Vec::new();
        let mut failures = Vec::new();
        for comp in self.graph.teardown_order() {
            for object in comp.objects.iter().rev() {
                let label = object.to_string();
                let call = self.backend.delete(&owner.namespace, object);
                match with_timeout(self.call_timeout, call).await {
                    Ok(()) => {
                        debug!(resource = %key, object = %label, "deleted");
                        changes.push(Change::Deleted(label));
                    }
                    Err(BackendError::NotFound(_)) => changes.push(Change::AlreadyGone(label)),
                    Err(err) => {
                        warn!(resource = %key, object = %label, error = %err, "delete failed");
                        failures.push(format!("{label}: {err}"));
                    }
                }
            }
        }

        let result = if failures.is_empty() {
            Ok(None)
        } else {
            Err(ReconcileError::Teardown(failures))
        };
        if self.status(&key).phase == ResourcePhase::Absent {
            // Teardown of a resource this process never created.
            return result.map(|_| ReconcileOutcome {
                operation: Operation::Delete,
                changes,
                status: ResourceStatus::default(),
            });
        }
        self.finish(&key, Operation::Delete, changes, result)
    }

    /// Level-triggered entry point: run whatever the current phase calls for.
    pub async fn reconcile(
        &self,
        owner: &OwnerLink,
        spec: &ClusterSpec,
    ) -> ReconcileResult<ReconcileOutcome> {
        match self.status(&owner.key()).next_operation() {
            Operation::Create => self.apply(owner, spec).await,
            Operation::Update => self.update(owner, spec).await,
            Operation::Delete => self.delete(owner).await,
        }
    }

    // ── Walk ───────────────────────────────────────────────────────

    /// Walk components in dependency order. Returns the first component
    /// that is not ready yet, if any.
    async fn walk(
        &self,
        op: Operation,
        owner: &OwnerLink,
        cfg: &ClusterConfig,
        changes: &mut Vec<Change>,
    ) -> ReconcileResult<Option<&'static str>> {
        for comp in self.graph.apply_order() {
            let objects = (comp.build)(cfg)?;
            let mut prerequisites_checked = false;
            for object in objects {
                // OwnerLink goes on before the object leaves the process.
                let object = object.with_owner(owner);
                if op == Operation::Update {
                    match self.call_patch(&object).await {
                        Ok(PatchOutcome::Patched) => {
                            changes.push(Change::Patched(object.to_string()));
                            continue;
                        }
                        Ok(PatchOutcome::Unchanged) => {
                            changes.push(Change::Unchanged(object.to_string()));
                            continue;
                        }
                        Err(BackendError::NotFound(_)) => {
                            debug!(object = %object, "patch target missing, creating");
                        }
                        Err(err) => return Err(ReconcileError::backend(&object, err)),
                    }
                }
                if !prerequisites_checked {
                    self.check_prerequisites(comp, &cfg.namespace).await?;
                    prerequisites_checked = true;
                }
                changes.push(self.create(&object).await?);
            }
        }

        for comp in self.graph.apply_order() {
            if !self.is_ready(comp, &cfg.namespace).await? {
                return Ok(Some(comp.name));
            }
        }
        Ok(None)
    }

    async fn create(&self, object: &InfraObject) -> ReconcileResult<Change> {
        match with_timeout(self.call_timeout, self.backend.create(object)).await {
            Ok(()) => {
                debug!(object = %object, "created");
                Ok(Change::Created(object.to_string()))
            }
            Err(BackendError::AlreadyExists(_)) => Ok(Change::AlreadyExisted(object.to_string())),
            Err(err) => Err(ReconcileError::backend(object, err)),
        }
    }

    async fn call_patch(&self, object: &InfraObject) -> Result<PatchOutcome, BackendError> {
        with_timeout(self.call_timeout, self.backend.patch(object)).await
    }

    async fn check_prerequisites(
        &self,
        comp: &ComponentDescriptor,
        namespace: &str,
    ) -> ReconcileResult<()> {
        for name in comp.prerequisites {
            let Some(prereq) = self.graph.get(name) else {
                continue;
            };
            if !self.is_ready(prereq, namespace).await? {
                return Err(ReconcileError::PrerequisiteNotReady {
                    component: comp.name,
                    prerequisite: prereq.name,
                });
            }
        }
        Ok(())
    }

    async fn is_ready(&self, comp: &ComponentDescriptor, namespace: &str) -> ReconcileResult<bool> {
        let object = &comp.readiness.object;
        let observed = with_timeout(self.call_timeout, self.backend.get(namespace, object))
            .await
            .map_err(|err| ReconcileError::backend(object, err))?;
        Ok(comp.readiness.is_satisfied(observed.as_ref()))
    }
}
