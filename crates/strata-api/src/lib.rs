//! strata-api — HTTP boundary of the control plane.
//!
//! Storage nodes call the generation authority here; compute nodes fetch
//! their bootstrap spec.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Liveness |
//! | POST | `/re-attach` | Current generations of a node's tenants |
//! | POST | `/validate` | Check generations, batched |
//! | POST | `/attach-hook` | Attach (new generation) or detach a tenant |
//! | GET | `/compute/api/v2/computes/{compute_id}/spec` | Compute bootstrap spec |
//! | GET | `/tenants` | Attachment records, for diagnostics |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use strata_fencing::GenerationAuthority;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub authority: GenerationAuthority,
    /// Namespace the cluster runs in; used to build in-cluster DNS names.
    pub namespace: String,
    /// Safekeeper replicas listed in compute specs.
    pub safekeepers: u32,
}

/// Build the control plane router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/re-attach", post(handlers::re_attach))
        .route("/validate", post(handlers::validate))
        .route("/attach-hook", post(handlers::attach_hook))
        .route(
            "/compute/api/v2/computes/{compute_id}/spec",
            get(handlers::compute_spec),
        )
        .route("/tenants", get(handlers::list_tenants))
        .with_state(state)
}
