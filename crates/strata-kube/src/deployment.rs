//! Watch loop for `StrataDeployment` resources.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::Api;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, ResourceExt};
use strata_core::config::OperatorConfig;
use strata_core::crd::StrataDeployment;
use strata_core::{OwnerLink, ResourceStatus};
use strata_reconcile::{Dispatcher, ReconcileError, Reconciler};
use tracing::{info, instrument, warn};

use crate::error::KubeResult;
use crate::resource::{add_finalizer, has_finalizer, owner_link, patch_status, remove_finalizer};

/// Must stay below the client read timeout so idle watches are closed by
/// the API server first.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

pub struct DeploymentContext {
    pub client: Client,
    pub reconciler: Reconciler,
    pub dispatcher: Dispatcher,
    pub operator: OperatorConfig,
    /// Leave the custom resources untouched: no finalizers, no status.
    pub dry_run: bool,
}

impl DeploymentContext {
    fn api(&self, namespace: &str) -> Api<StrataDeployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn write_status(&self, obj: &StrataDeployment, status: &ResourceStatus) -> KubeResult<()> {
        if self.dry_run {
            info!(
                resource = %obj.name_any(),
                phase = ?status.phase,
                reason = status.reason.as_deref().unwrap_or(""),
                "dry run: status not written"
            );
            return Ok(());
        }
        let namespace = obj.namespace().unwrap_or_default();
        patch_status(&self.api(&namespace), obj, status).await
    }
}

#[instrument(skip(obj, ctx), fields(resource = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<StrataDeployment>,
    ctx: Arc<DeploymentContext>,
) -> KubeResult<Action> {
    let owner = owner_link(obj.as_ref())?;
    let key = owner.key();
    ctx.dispatcher
        .run(&key, || reconcile_one(&obj, &owner, &ctx))
        .await
}

async fn reconcile_one(
    obj: &StrataDeployment,
    owner: &OwnerLink,
    ctx: &DeploymentContext,
) -> KubeResult<Action> {
    let key = owner.key();
    let api = ctx.api(&owner.namespace);
    ctx.reconciler
        .restore_status(&key, obj.status.clone().unwrap_or_default());

    if obj.metadata.deletion_timestamp.is_some() {
        if !has_finalizer(obj) {
            return Ok(Action::await_change());
        }
        return match ctx.reconciler.delete(owner).await {
            Ok(_) => {
                remove_finalizer(&api, obj).await?;
                info!(resource = %key, "teardown complete");
                Ok(Action::await_change())
            }
            Err(err) => {
                ctx.write_status(obj, &ctx.reconciler.status(&key)).await?;
                Err(err.into())
            }
        };
    }

    if !ctx.dry_run {
        add_finalizer(&api, obj).await?;
    }

    match ctx.reconciler.reconcile(owner, &obj.spec).await {
        Ok(outcome) => {
            ctx.write_status(obj, &outcome.status).await?;
            if outcome.is_ready() {
                Ok(Action::requeue(ctx.operator.resync()))
            } else {
                Ok(Action::requeue(ctx.operator.not_ready()))
            }
        }
        Err(ReconcileError::Config(err)) => {
            // Nothing to retry until the resource is edited.
            ctx.write_status(obj, &ctx.reconciler.status(&key)).await?;
            warn!(resource = %key, error = %err, "spec rejected");
            Ok(Action::await_change())
        }
        Err(ReconcileError::PrerequisiteNotReady { .. }) => {
            ctx.write_status(obj, &ctx.reconciler.status(&key)).await?;
            Ok(Action::requeue(ctx.operator.not_ready()))
        }
        Err(err) => {
            ctx.write_status(obj, &ctx.reconciler.status(&key)).await?;
            Err(err.into())
        }
    }
}

pub fn error_policy(
    obj: Arc<StrataDeployment>,
    error: &crate::error::KubeError,
    ctx: Arc<DeploymentContext>,
) -> Action {
    warn!(resource = %obj.name_any(), %error, "reconcile failed, retrying");
    Action::requeue(ctx.operator.retry())
}

/// Run the deployment controller until a shutdown signal arrives.
///
/// Changes to the workloads it owns wake the owning resource, so readiness
/// is picked up without waiting for the requeue.
pub async fn run(ctx: Arc<DeploymentContext>, namespace: &str) {
    let client = ctx.client.clone();
    let deployments: Api<StrataDeployment> = Api::namespaced(client.clone(), namespace);
    let workloads: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let stateful: Api<StatefulSet> = Api::namespaced(client, namespace);
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    info!(namespace, "StrataDeployment controller starting");
    Controller::new(deployments, watcher())
        .owns(workloads, watcher())
        .owns(stateful, watcher())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_result("StrataDeployment"))
        .await;
}

pub(crate) fn log_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, controller, "reconciliation completed"),
            Err(e) => tracing::debug!(error = ?e, controller, "reconciliation error"),
        }
        std::future::ready(())
    }
}
