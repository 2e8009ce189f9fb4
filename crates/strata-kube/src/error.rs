//! Adapter error types.

use strata_reconcile::{ReconcileError, TenantError};
use thiserror::Error;

pub type KubeResult<T> = Result<T, KubeError>;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("object is missing metadata.{0}")]
    MissingMetadata(&'static str),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
