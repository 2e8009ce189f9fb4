//! Control plane mode.
//!
//! In this mode the daemon:
//! 1. Opens the attachment store and the generation authority on top of it
//! 2. Optionally watches tenant and timeline resources
//! 3. Serves the control plane API until a shutdown signal arrives

use std::net::SocketAddr;
use std::sync::Arc;

use strata_api::ApiState;
use strata_core::StrataConfig;
use strata_fencing::GenerationAuthority;
use strata_kube::TenantContext;
use strata_reconcile::{Dispatcher, HttpStorageNodeClient, TenantReconciler};
use strata_state::StateStore;
use tracing::{info, warn};

pub async fn run_control_plane(config: StrataConfig, safekeepers: u32) -> anyhow::Result<()> {
    info!(namespace = %config.namespace, "Strata control plane starting");

    // ── Attachment store ─────────────────────────────────────────
    let data_dir = &config.control_plane.data_dir;
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("strata.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "attachment store opened");

    let authority = GenerationAuthority::new(store);

    // ── Tenant and timeline controllers ──────────────────────────
    let controllers = if config.control_plane.watch_tenants {
        let client = kube::Client::try_default().await?;
        let storage = Arc::new(HttpStorageNodeClient::new(
            &config.namespace,
            config.storage_node.http_port,
            config.storage_node.timeout(),
        ));
        let ctx = Arc::new(TenantContext {
            client,
            tenants: TenantReconciler::new(authority.clone(), storage),
            dispatcher: Dispatcher::new(),
            operator: config.operator.clone(),
        });
        let namespace = config.namespace.clone();
        Some(tokio::spawn(async move {
            strata_kube::tenant::run(ctx, &namespace).await;
        }))
    } else {
        info!("tenant watch disabled");
        None
    };

    // ── API server ───────────────────────────────────────────────
    let router = strata_api::build_router(ApiState {
        authority,
        namespace: config.namespace.clone(),
        safekeepers,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.control_plane.port));
    info!(%addr, safekeepers, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The controllers stop on the same signal.
    if let Some(handle) = controllers {
        join_controllers(handle).await;
    }

    info!("control plane stopped");
    Ok(())
}

/// Wait for the controller task. Returns false if it panicked or was cancelled.
async fn join_controllers(handle: tokio::task::JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "tenant controllers exited abnormally");
            false
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn controller_panic_is_reported() {
        assert!(join_controllers(tokio::spawn(async {})).await);

        let handle: tokio::task::JoinHandle<()> =
            tokio::spawn(async { panic!("watch loop failed") });
        assert!(!join_controllers(handle).await);
    }
}
