//! strata-state — durable store for tenant attachments and timelines.
//!
//! Backed by [redb](https://docs.rs/redb). Attachment records are the
//! source of truth for tenant generations and must survive a control-plane
//! restart; timeline records bind compute nodes to a tenant's timeline.
//!
//! Values are JSON-serialized into `&[u8]` columns. Timelines are keyed by
//! the `(tenant_id, timeline_id)` tuple; ids are opaque and may contain any
//! character.
//!
//! Clones of a [`StateStore`] share one database handle.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
