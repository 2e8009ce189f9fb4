//! strata-fencing — the generation authority.
//!
//! Storage nodes may only serve a tenant under the generation most
//! recently issued for it. Every attach to a node bumps the generation, so
//! a node that lost the tenant and did not notice will fail validation and
//! stop acting on stale ownership.

pub mod authority;
pub mod error;

pub use authority::{GenerationAuthority, TenantGeneration, ValidationResult};
pub use error::{FencingError, FencingResult};
