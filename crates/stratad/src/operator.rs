//! Operator mode — watches `StrataDeployment` resources and drives the
//! cluster components through the reconciler.

use std::sync::Arc;

use strata_core::StrataConfig;
use strata_kube::{DeploymentContext, KubeBackend};
use strata_reconcile::{DependencyGraph, Dispatcher, MemoryBackend, OrchestrationBackend, Reconciler};
use tracing::{info, warn};

pub async fn run_operator(config: StrataConfig, dry_run: bool) -> anyhow::Result<()> {
    info!(namespace = %config.namespace, dry_run, "Strata operator starting");

    let client = kube::Client::try_default().await?;
    let backend: Arc<dyn OrchestrationBackend> = if dry_run {
        warn!("dry run: infrastructure changes stay in memory");
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(KubeBackend::new(client.clone()))
    };

    let graph = DependencyGraph::cluster()?;
    info!(order = ?graph.names(), "dependency graph built");

    let reconciler = Reconciler::new(
        backend,
        graph,
        config.images.clone(),
        config.operator.call_timeout(),
    );
    let ctx = Arc::new(DeploymentContext {
        client,
        reconciler,
        dispatcher: Dispatcher::new(),
        operator: config.operator.clone(),
        dry_run,
    });

    strata_kube::deployment::run(ctx, &config.namespace).await;

    info!("operator stopped");
    Ok(())
}
