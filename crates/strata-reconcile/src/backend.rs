//! Orchestration backend boundary.
//!
//! The only place the reconciler talks to the outside world. Implemented
//! for Kubernetes in `strata-kube` and in memory in [`crate::memory`].

use std::time::Duration;

use async_trait::async_trait;
use strata_builder::{InfraObject, ObjectRef};
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of a patch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched,
    /// The object already matched the desired manifest.
    Unchanged,
}

/// What the backend reports about a live object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedObject {
    /// Desired replicas for workloads, `None` for plain objects.
    pub replicas: Option<u32>,
    pub ready_replicas: u32,
}

#[async_trait]
pub trait OrchestrationBackend: Send + Sync {
    /// Create `object`. Fails with `AlreadyExists` when it is present.
    async fn create(&self, object: &InfraObject) -> BackendResult<()>;

    /// Bring an existing object in line with `object`. Fails with
    /// `NotFound` when it is absent.
    async fn patch(&self, object: &InfraObject) -> BackendResult<PatchOutcome>;

    /// Delete an object. Fails with `NotFound` when it is absent.
    async fn delete(&self, namespace: &str, object: &ObjectRef) -> BackendResult<()>;

    async fn get(&self, namespace: &str, object: &ObjectRef)
    -> BackendResult<Option<ObservedObject>>;
}

/// Run a backend call with an upper bound on its duration.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl std::future::Future<Output = BackendResult<T>>,
) -> BackendResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_call_becomes_timeout() {
        let result: BackendResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(BackendError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async {
            Err::<(), _>(BackendError::NotFound("Secret/x".to_string()))
        })
        .await;
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }
}
