//! Control plane handlers.
//!
//! Request and response bodies follow the storage node's wire format, so
//! successful responses are bare JSON documents. Failures use the
//! `{success, error}` envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use strata_builder::compute_spec::{attached_compute_spec, empty_compute_spec};
use strata_core::compute::{ComputeStatus, ControlPlaneSpecResponse};
use strata_core::{Generation, NodeId, TenantId};
use strata_fencing::TenantGeneration;
use tracing::{debug, error};

use crate::ApiState;

/// Error envelope.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal_error(err: impl std::fmt::Display) -> axum::response::Response {
    error!(error = %err, "request failed");
    error_response(&err.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

// ── Wire types ─────────────────────────────────────────────────

/// Node ids arrive as strings from some storage node versions and as
/// integers from others.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NodeIdField {
    Text(String),
    Number(u64),
}

impl From<NodeIdField> for NodeId {
    fn from(field: NodeIdField) -> Self {
        match field {
            NodeIdField::Text(s) => s,
            NodeIdField::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReAttachRequest {
    pub node_id: NodeIdField,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantGen {
    pub id: TenantId,
    #[serde(rename = "gen")]
    pub generation: Generation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReAttachResponse {
    pub tenants: Vec<TenantGen>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub tenants: Vec<TenantGen>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantValidity {
    pub id: TenantId,
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub tenants: Vec<TenantValidity>,
}

#[derive(Debug, Deserialize)]
pub struct AttachHookRequest {
    pub tenant_id: TenantId,
    /// Empty or null detaches.
    #[serde(default)]
    pub node_id: Option<NodeIdField>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachHookResponse {
    #[serde(rename = "gen")]
    pub generation: Generation,
}

// ── Handlers ───────────────────────────────────────────────────

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Control Plane API is running" }))
}

/// POST /re-attach
pub async fn re_attach(
    State(state): State<ApiState>,
    Json(req): Json<ReAttachRequest>,
) -> impl IntoResponse {
    let node_id = NodeId::from(req.node_id);
    match state.authority.re_attach(&node_id) {
        Ok(tenants) => Json(ReAttachResponse {
            tenants: tenants
                .into_iter()
                .map(|t| TenantGen {
                    id: t.tenant_id,
                    generation: t.generation,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /validate
pub async fn validate(
    State(state): State<ApiState>,
    Json(req): Json<ValidateRequest>,
) -> impl IntoResponse {
    let query: Vec<TenantGeneration> = req
        .tenants
        .into_iter()
        .map(|t| TenantGeneration {
            tenant_id: t.id,
            generation: t.generation,
        })
        .collect();
    match state.authority.validate_batch(&query) {
        Ok(results) => Json(ValidateResponse {
            tenants: results
                .into_iter()
                .map(|r| TenantValidity {
                    id: r.tenant_id,
                    valid: r.valid,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /attach-hook
pub async fn attach_hook(
    State(state): State<ApiState>,
    Json(req): Json<AttachHookRequest>,
) -> impl IntoResponse {
    let node_id = req.node_id.map(NodeId::from);
    match state
        .authority
        .attach_hook(&req.tenant_id, node_id.as_deref())
        .await
    {
        Ok(generation) => Json(AttachHookResponse { generation }).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /compute/api/v2/computes/{compute_id}/spec
pub async fn compute_spec(
    State(state): State<ApiState>,
    Path(compute_id): Path<String>,
) -> impl IntoResponse {
    let timeline = match state.authority.store().find_timeline_by_compute(&compute_id) {
        Ok(t) => t,
        Err(e) => return internal_error(e),
    };

    let response = match timeline {
        Some(record) => {
            let node = match state.authority.assigned_node(&record.tenant_id) {
                Ok(node) => node,
                Err(e) => return internal_error(e),
            };
            debug!(
                compute_id = %compute_id,
                tenant_id = %record.tenant_id,
                timeline_id = %record.timeline_id,
                "serving attached compute spec"
            );
            ControlPlaneSpecResponse {
                spec: attached_compute_spec(
                    &state.namespace,
                    state.safekeepers,
                    &compute_id,
                    &record.tenant_id,
                    &record.timeline_id,
                    node.as_deref(),
                ),
                status: ComputeStatus::Attached,
            }
        }
        None => ControlPlaneSpecResponse {
            spec: empty_compute_spec(&state.namespace, state.safekeepers),
            status: ComputeStatus::Empty,
        },
    };
    Json(response).into_response()
}

/// GET /tenants
pub async fn list_tenants(State(state): State<ApiState>) -> impl IntoResponse {
    match state.authority.tenants() {
        Ok(tenants) => ApiResponse::ok(tenants).into_response(),
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;
    use strata_fencing::GenerationAuthority;
    use strata_state::{StateStore, TimelineRecord};

    fn test_state() -> ApiState {
        ApiState {
            authority: GenerationAuthority::new(StateStore::open_in_memory().unwrap()),
            namespace: "neon".to_string(),
            safekeepers: 3,
        }
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn node_id_accepts_string_or_number() {
        let req: ReAttachRequest = serde_json::from_str(r#"{"node_id": "7"}"#).unwrap();
        assert_eq!(NodeId::from(req.node_id), "7");
        let req: ReAttachRequest = serde_json::from_str(r#"{"node_id": 7}"#).unwrap();
        assert_eq!(NodeId::from(req.node_id), "7");
    }

    #[test]
    fn attach_hook_node_may_be_null_or_missing() {
        let req: AttachHookRequest =
            serde_json::from_str(r#"{"tenant_id": "t1", "node_id": null}"#).unwrap();
        assert!(req.node_id.is_none());
        let req: AttachHookRequest = serde_json::from_str(r#"{"tenant_id": "t1"}"#).unwrap();
        assert!(req.node_id.is_none());
    }

    #[tokio::test]
    async fn root_reports_liveness() {
        let resp = root().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_json(resp).await["message"].is_string());
    }

    #[tokio::test]
    async fn attach_hook_bumps_generation() {
        let state = test_state();
        for expected in 1..=2 {
            let req = AttachHookRequest {
                tenant_id: "t1".to_string(),
                node_id: Some(NodeIdField::Number(1)),
            };
            let resp = attach_hook(State(state.clone()), Json(req)).await.into_response();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_json(resp).await["gen"], expected);
        }
    }

    #[tokio::test]
    async fn re_attach_lists_node_tenants() {
        let state = test_state();
        state.authority.attach_hook("t1", Some("1")).await.unwrap();
        state.authority.attach_hook("t2", Some("2")).await.unwrap();

        let req = ReAttachRequest {
            node_id: NodeIdField::Text("1".to_string()),
        };
        let resp = re_attach(State(state), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["tenants"], serde_json::json!([{ "id": "t1", "gen": 1 }]));
    }

    #[tokio::test]
    async fn validate_rejects_stale_and_unknown() {
        let state = test_state();
        state.authority.attach_hook("t1", Some("1")).await.unwrap();
        state.authority.attach_hook("t1", Some("2")).await.unwrap();

        let req = ValidateRequest {
            tenants: vec![
                TenantGen { id: "t1".into(), generation: 1 },
                TenantGen { id: "t1".into(), generation: 2 },
                TenantGen { id: "ghost".into(), generation: 0 },
            ],
        };
        let resp = validate(State(state), Json(req)).await.into_response();
        let body = body_json(resp).await;
        let valid: Vec<bool> = body["tenants"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["valid"].as_bool().unwrap())
            .collect();
        assert_eq!(valid, vec![false, true, false]);
    }

    #[tokio::test]
    async fn unknown_compute_gets_empty_spec() {
        let state = test_state();
        let resp = compute_spec(State(state), Path("nobody".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "Empty");
        assert_eq!(body["spec"]["safekeeper_connstrings"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn bound_compute_gets_attached_spec() {
        let state = test_state();
        state.authority.attach_hook("t1", Some("0")).await.unwrap();
        state
            .authority
            .store()
            .put_timeline(&TimelineRecord {
                tenant_id: "t1".into(),
                timeline_id: "tl1".into(),
                compute_id: Some("compute-a".into()),
                pg_version: 16,
                created_at: 0,
            })
            .unwrap();

        let resp = compute_spec(State(state), Path("compute-a".to_string()))
            .await
            .into_response();
        let body = body_json(resp).await;
        assert_eq!(body["status"], "Attached");
        assert_eq!(body["spec"]["tenant_id"], "t1");
        assert_eq!(body["spec"]["timeline_id"], "tl1");
        assert!(
            body["spec"]["pageserver_connstring"]
                .as_str()
                .unwrap()
                .contains("pageserver-0")
        );
    }

    #[tokio::test]
    async fn tenants_listed_in_envelope() {
        let state = test_state();
        state.authority.attach_hook("t1", Some("0")).await.unwrap();
        let resp = list_tenants(State(state)).await.into_response();
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0]["tenant_id"], "t1");
    }
}
