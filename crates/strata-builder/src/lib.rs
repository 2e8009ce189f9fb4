//! strata-builder — pure functions from validated cluster config to the
//! infrastructure objects that run each component.
//!
//! Nothing here performs I/O. Given the same [`ClusterConfig`] every
//! builder returns the same manifests, so repeated reconciliation of an
//! unchanged spec produces no-op patches.
//!
//! [`ClusterConfig`]: strata_core::ClusterConfig

pub mod components;
pub mod compute_spec;
pub mod dns;
pub mod error;
pub mod object;

pub use error::{BuildError, BuildResult};
pub use object::{InfraObject, ObjectKind, ObjectRef};
