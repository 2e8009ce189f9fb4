//! strata-core — shared domain types for Strata.
//!
//! Everything the other crates agree on lives here: the raw and validated
//! cluster spec, the custom resource definitions watched by the operator,
//! the per-resource lifecycle phases, the compute spec document served to
//! compute nodes, daemon configuration, and keyed async locks.

pub mod compute;
pub mod config;
pub mod crd;
pub mod lifecycle;
pub mod spec;
pub mod sync;
pub mod types;

pub use config::StrataConfig;
pub use lifecycle::{InvalidTransition, Operation, ResourcePhase, ResourceStatus};
pub use spec::{ClusterConfig, ClusterSpec, ConfigError};
pub use sync::KeyedLocks;
pub use types::*;
