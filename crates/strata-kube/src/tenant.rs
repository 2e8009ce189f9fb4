//! Watch loops for `StrataTenant` and `StrataTimeline` resources.
//!
//! Both run inside the control plane, the only process that writes
//! attachment records. Reconciles for one tenant, and for all of its
//! timelines, share a dispatcher key so a timeline is never created while
//! its tenant is moving.

use std::sync::Arc;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, ResourceExt};
use strata_core::config::OperatorConfig;
use strata_core::crd::{StrataTenant, StrataTimeline};
use strata_core::{Operation, ResourcePhase, ResourceStatus};
use strata_reconcile::{Dispatcher, TenantError, TenantReconciler};
use tracing::{info, instrument, warn};

use crate::deployment::{WATCH_TIMEOUT_SECS, log_result};
use crate::error::{KubeError, KubeResult};
use crate::resource::{add_finalizer, has_finalizer, patch_status, remove_finalizer};

pub struct TenantContext {
    pub client: Client,
    pub tenants: TenantReconciler,
    pub dispatcher: Dispatcher,
    pub operator: OperatorConfig,
}

fn dispatch_key(tenant_id: &str) -> String {
    format!("tenant/{tenant_id}")
}

fn ready() -> ResourceStatus {
    ResourceStatus {
        phase: ResourcePhase::Ready,
        ..Default::default()
    }
}

fn failed(op: Operation, err: &impl std::fmt::Display) -> ResourceStatus {
    ResourceStatus {
        phase: ResourcePhase::Degraded,
        reason: Some(err.to_string()),
        pending_operation: Some(op),
        observed_generation: None,
    }
}

// ── Tenants ────────────────────────────────────────────────────

#[instrument(skip(obj, ctx), fields(tenant = %obj.spec.tenant_id))]
pub async fn reconcile_tenant(obj: Arc<StrataTenant>, ctx: Arc<TenantContext>) -> KubeResult<Action> {
    let key = dispatch_key(&obj.spec.tenant_id);
    ctx.dispatcher.run(&key, || tenant_one(&obj, &ctx)).await
}

async fn tenant_one(obj: &StrataTenant, ctx: &TenantContext) -> KubeResult<Action> {
    let api: Api<StrataTenant> =
        Api::namespaced(ctx.client.clone(), &obj.namespace().unwrap_or_default());
    let tenant_id = obj.spec.tenant_id.as_str();

    if obj.metadata.deletion_timestamp.is_some() {
        if !has_finalizer(obj) {
            return Ok(Action::await_change());
        }
        return match ctx.tenants.delete_tenant(tenant_id).await {
            Ok(()) => {
                remove_finalizer(&api, obj).await?;
                Ok(Action::await_change())
            }
            Err(err) => {
                patch_status(&api, obj, &failed(Operation::Delete, &err)).await?;
                Err(err.into())
            }
        };
    }

    add_finalizer(&api, obj).await?;
    match ctx.tenants.apply_tenant(&obj.spec).await {
        Ok(record) => {
            let mut status = ready();
            if let Some(node) = &record.node_id {
                status.reason = Some(format!("attached to {node} at generation {}", record.generation));
            }
            patch_status(&api, obj, &status).await?;
            Ok(Action::requeue(ctx.operator.resync()))
        }
        Err(err) => {
            patch_status(&api, obj, &failed(Operation::Create, &err)).await?;
            Err(err.into())
        }
    }
}

// ── Timelines ──────────────────────────────────────────────────

#[instrument(skip(obj, ctx), fields(tenant = %obj.spec.tenant_id, timeline = %obj.spec.timeline_id))]
pub async fn reconcile_timeline(
    obj: Arc<StrataTimeline>,
    ctx: Arc<TenantContext>,
) -> KubeResult<Action> {
    let key = dispatch_key(&obj.spec.tenant_id);
    ctx.dispatcher.run(&key, || timeline_one(&obj, &ctx)).await
}

async fn timeline_one(obj: &StrataTimeline, ctx: &TenantContext) -> KubeResult<Action> {
    let api: Api<StrataTimeline> =
        Api::namespaced(ctx.client.clone(), &obj.namespace().unwrap_or_default());
    let spec = &obj.spec;

    if obj.metadata.deletion_timestamp.is_some() {
        if !has_finalizer(obj) {
            return Ok(Action::await_change());
        }
        return match ctx.tenants.delete_timeline(&spec.tenant_id, &spec.timeline_id).await {
            Ok(_) => {
                remove_finalizer(&api, obj).await?;
                Ok(Action::await_change())
            }
            Err(err) => {
                patch_status(&api, obj, &failed(Operation::Delete, &err)).await?;
                Err(err.into())
            }
        };
    }

    add_finalizer(&api, obj).await?;
    match ctx.tenants.apply_timeline(spec).await {
        Ok(_) => {
            patch_status(&api, obj, &ready()).await?;
            Ok(Action::requeue(ctx.operator.resync()))
        }
        Err(err @ TenantError::NotAttached(_)) => {
            let status = ResourceStatus {
                phase: ResourcePhase::Creating,
                reason: Some(err.to_string()),
                pending_operation: Some(Operation::Create),
                observed_generation: None,
            };
            patch_status(&api, obj, &status).await?;
            Ok(Action::requeue(ctx.operator.not_ready()))
        }
        Err(err) => {
            patch_status(&api, obj, &failed(Operation::Create, &err)).await?;
            Err(err.into())
        }
    }
}

pub fn error_policy<K: ResourceExt>(obj: Arc<K>, error: &KubeError, ctx: Arc<TenantContext>) -> Action {
    warn!(resource = %obj.name_any(), %error, "reconcile failed, retrying");
    Action::requeue(ctx.operator.retry())
}

/// Run the tenant and timeline controllers until a shutdown signal arrives.
pub async fn run(ctx: Arc<TenantContext>, namespace: &str) {
    let tenants: Api<StrataTenant> = Api::namespaced(ctx.client.clone(), namespace);
    let timelines: Api<StrataTimeline> = Api::namespaced(ctx.client.clone(), namespace);
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    info!(namespace, "tenant and timeline controllers starting");
    let tenant_ctrl = Controller::new(tenants, watcher())
        .shutdown_on_signal()
        .run(reconcile_tenant, error_policy, ctx.clone())
        .for_each(log_result("StrataTenant"));
    let timeline_ctrl = Controller::new(timelines, watcher())
        .shutdown_on_signal()
        .run(reconcile_timeline, error_policy, ctx)
        .for_each(log_result("StrataTimeline"));

    futures::join!(tenant_ctrl, timeline_ctrl);
}
