//! strata-reconcile — drives infrastructure toward the declared cluster.
//!
//! The [`Reconciler`] walks the component [`DependencyGraph`], building
//! manifests with `strata-builder` and pushing them through an
//! [`OrchestrationBackend`]. The [`TenantReconciler`] places tenants on
//! storage nodes through the generation authority.

pub mod backend;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod memory;
pub mod storage_client;
pub mod tenant;

pub use backend::{BackendError, BackendResult, ObservedObject, OrchestrationBackend, PatchOutcome};
pub use controller::{Change, ReconcileOutcome, Reconciler};
pub use dispatch::Dispatcher;
pub use error::{ReconcileError, ReconcileResult, TenantError, TenantResult};
pub use graph::{ComponentDescriptor, DependencyGraph, GraphError, ReadyWhen, Readiness};
pub use memory::MemoryBackend;
pub use storage_client::{HttpStorageNodeClient, StorageError, StorageNodeApi, StorageResult};
pub use tenant::TenantReconciler;
