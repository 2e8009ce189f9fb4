//! Reconciliation error types.

use strata_builder::BuildError;
use strata_core::{ConfigError, InvalidTransition};
use strata_fencing::FencingError;
use strata_state::StateError;
use thiserror::Error;

use crate::backend::BackendError;
use crate::graph::GraphError;
use crate::storage_client::StorageError;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid cluster spec: {0}")]
    Config(#[from] ConfigError),

    #[error("{component} is waiting for {prerequisite} to become ready")]
    PrerequisiteNotReady {
        component: &'static str,
        prerequisite: &'static str,
    },

    #[error("{object}: {source}")]
    Backend {
        object: String,
        #[source]
        source: BackendError,
    },

    #[error("teardown failed: {}", .0.join("; "))]
    Teardown(Vec<String>),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("dependency graph error: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl ReconcileError {
    pub fn backend(object: impl ToString, source: BackendError) -> Self {
        Self::Backend {
            object: object.to_string(),
            source,
        }
    }

    /// Whether trying again later may succeed without a spec change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::PrerequisiteNotReady { .. }
                | ReconcileError::Backend { .. }
                | ReconcileError::Teardown(_)
        )
    }
}

pub type TenantResult<T> = Result<T, TenantError>;

/// Errors from tenant and timeline reconciliation. All are retryable.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("generation authority error: {0}")]
    Fencing(#[from] FencingError),

    #[error("storage node {node}: {source}")]
    Storage {
        node: String,
        #[source]
        source: StorageError,
    },

    #[error("tenant {0} is not attached to any storage node")]
    NotAttached(String),

    #[error("tenant teardown failed: {}", .0.join("; "))]
    Teardown(Vec<String>),
}

impl TenantError {
    pub fn storage(node: &str, source: StorageError) -> Self {
        Self::Storage {
            node: node.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_final() {
        let err = ReconcileError::from(ConfigError::MissingFields(vec!["storageConfig.region"]));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("storageConfig.region"));
    }

    #[test]
    fn backend_and_readiness_errors_retry() {
        assert!(ReconcileError::backend("Secret/x", BackendError::Unavailable("down".into()))
            .is_retryable());
        assert!(ReconcileError::PrerequisiteNotReady {
            component: "pageserver",
            prerequisite: "safekeeper",
        }
        .is_retryable());
    }
}
