//! Tenant and timeline reconciliation.
//!
//! Moves tenants between storage nodes through the generation authority
//! and keeps timelines on the attached node in line with their records.

use std::sync::Arc;

use strata_core::crd::{TenantSpec, TimelineSpec};
use strata_fencing::GenerationAuthority;
use strata_state::{AttachmentRecord, TimelineRecord, now_secs};
use tracing::{info, warn};

use crate::error::{TenantError, TenantResult};
use crate::storage_client::StorageNodeApi;

#[derive(Clone)]
pub struct TenantReconciler {
    authority: GenerationAuthority,
    storage: Arc<dyn StorageNodeApi>,
}

impl TenantReconciler {
    pub fn new(authority: GenerationAuthority, storage: Arc<dyn StorageNodeApi>) -> Self {
        Self { authority, storage }
    }

    pub fn authority(&self) -> &GenerationAuthority {
        &self.authority
    }

    /// Bring a tenant's attachment in line with `spec.pageserver`.
    ///
    /// A new target node gets a fresh generation before the node is told
    /// to attach; the previous node is asked to detach first but a failure
    /// there does not block the move. An unchanged target resends the
    /// attach with the current generation.
    pub async fn apply_tenant(&self, spec: &TenantSpec) -> TenantResult<AttachmentRecord> {
        let tenant_id = spec.tenant_id.as_str();
        let current = self.authority.register_tenant(tenant_id).await?;
        let wanted = spec.pageserver.as_deref().filter(|n| !n.is_empty());

        match (current.node_id.as_deref(), wanted) {
            (Some(node), Some(target)) if node == target => {
                self.storage
                    .attach_tenant(target, tenant_id, current.generation)
                    .await
                    .map_err(|e| TenantError::storage(target, e))?;
            }
            (previous, Some(target)) => {
                if let Some(old) = previous {
                    if let Err(e) = self.storage.detach_tenant(old, tenant_id).await {
                        warn!(tenant_id, node_id = old, error = %e, "detach from previous node failed");
                    }
                }
                let generation = self.authority.attach_hook(tenant_id, Some(target)).await?;
                self.storage
                    .attach_tenant(target, tenant_id, generation)
                    .await
                    .map_err(|e| TenantError::storage(target, e))?;
                info!(tenant_id, node_id = target, generation, "tenant placed");
            }
            (Some(old), None) => {
                self.storage
                    .detach_tenant(old, tenant_id)
                    .await
                    .map_err(|e| TenantError::storage(old, e))?;
                self.authority.attach_hook(tenant_id, None).await?;
            }
            (None, None) => {}
        }

        Ok(self
            .authority
            .tenant(tenant_id)?
            .unwrap_or_else(|| AttachmentRecord::new(tenant_id)))
    }

    /// Remove every timeline of the tenant, then detach it.
    ///
    /// The attachment record is kept so a recreated tenant continues from
    /// the same generation.
    pub async fn delete_tenant(&self, tenant_id: &str) -> TenantResult<()> {
        let node = self.authority.assigned_node(tenant_id)?;
        let timelines = self.authority.store().list_timelines_for_tenant(tenant_id)?;

        let mut failures = Vec::new();
        for timeline in &timelines {
            if let Err(e) = self.remove_timeline(node.as_deref(), timeline).await {
                failures.push(format!("timeline {}: {e}", timeline.timeline_id));
            }
        }
        if let Some(node) = node.as_deref() {
            match self.storage.detach_tenant(node, tenant_id).await {
                Ok(()) => {
                    self.authority.attach_hook(tenant_id, None).await?;
                }
                Err(e) => failures.push(format!("detach from {node}: {e}")),
            }
        }

        if failures.is_empty() {
            info!(tenant_id, timelines = timelines.len(), "tenant removed");
            Ok(())
        } else {
            Err(TenantError::Teardown(failures))
        }
    }

    /// Record the timeline and create it on the tenant's node.
    pub async fn apply_timeline(&self, spec: &TimelineSpec) -> TenantResult<TimelineRecord> {
        let store = self.authority.store();
        let created_at = store
            .get_timeline(&spec.tenant_id, &spec.timeline_id)?
            .map(|r| r.created_at)
            .unwrap_or_else(now_secs);
        let record = TimelineRecord {
            tenant_id: spec.tenant_id.clone(),
            timeline_id: spec.timeline_id.clone(),
            compute_id: spec.compute_id.clone(),
            pg_version: spec.pg_version,
            created_at,
        };
        store.put_timeline(&record)?;

        let node = self
            .authority
            .assigned_node(&spec.tenant_id)?
            .ok_or_else(|| TenantError::NotAttached(spec.tenant_id.clone()))?;
        self.storage
            .create_timeline(&node, &spec.tenant_id, &spec.timeline_id, spec.pg_version)
            .await
            .map_err(|e| TenantError::storage(&node, e))?;
        info!(
            tenant_id = %spec.tenant_id,
            timeline_id = %spec.timeline_id,
            node_id = %node,
            "timeline ready"
        );
        Ok(record)
    }

    /// Delete a timeline from its node and the store. Returns whether a
    /// record existed.
    pub async fn delete_timeline(&self, tenant_id: &str, timeline_id: &str) -> TenantResult<bool> {
        let Some(record) = self.authority.store().get_timeline(tenant_id, timeline_id)? else {
            return Ok(false);
        };
        let node = self.authority.assigned_node(tenant_id)?;
        self.remove_timeline(node.as_deref(), &record).await?;
        Ok(true)
    }

    async fn remove_timeline(
        &self,
        node: Option<&str>,
        record: &TimelineRecord,
    ) -> TenantResult<()> {
        if let Some(node) = node {
            self.storage
                .delete_timeline(node, &record.tenant_id, &record.timeline_id)
                .await
                .map_err(|e| TenantError::storage(node, e))?;
        }
        self.authority
            .store()
            .delete_timeline(&record.tenant_id, &record.timeline_id)?;
        Ok(())
    }
}
