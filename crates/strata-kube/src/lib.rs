//! strata-kube — Kubernetes side of Strata.
//!
//! [`KubeBackend`] implements the orchestration backend over the API
//! server. The `deployment` and `tenant` modules run the watch loops that
//! feed custom resource events into the reconcilers and write status back.

pub mod backend;
pub mod deployment;
pub mod error;
pub mod resource;
pub mod tenant;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;
use strata_core::crd::{StrataDeployment, StrataTenant, StrataTimeline};

pub use backend::KubeBackend;
pub use deployment::DeploymentContext;
pub use error::{KubeError, KubeResult};
pub use tenant::TenantContext;

/// Definitions of every custom resource Strata watches.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        StrataDeployment::crd(),
        StrataTenant::crd(),
        StrataTimeline::crd(),
    ]
}
