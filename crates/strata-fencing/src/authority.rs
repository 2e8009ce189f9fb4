//! Generation issuing and validation.

use serde::{Deserialize, Serialize};
use strata_core::{Generation, KeyedLocks, NodeId, TenantId};
use strata_state::{AttachmentRecord, StateStore, now_secs};
use tracing::{debug, info};

use crate::error::{FencingError, FencingResult};

/// A tenant and the generation a node must present for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantGeneration {
    pub tenant_id: TenantId,
    pub generation: Generation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub tenant_id: TenantId,
    pub valid: bool,
}

/// Sole writer of attachment records.
///
/// Mutations for one tenant are serialized by a per-tenant async lock and
/// each runs as a single store transaction; reads go straight to the
/// store.
#[derive(Clone)]
pub struct GenerationAuthority {
    store: StateStore,
    locks: KeyedLocks,
}

impl GenerationAuthority {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Assign `tenant_id` to `node_id`, or detach it when the node is empty.
    ///
    /// Attaching always issues a fresh generation, even when the tenant is
    /// already on that node. Detaching keeps the generation. Detaching a
    /// tenant the authority has never seen creates nothing and returns 0.
    pub async fn attach_hook(
        &self,
        tenant_id: &str,
        node_id: Option<&str>,
    ) -> FencingResult<Generation> {
        let node_id = node_id.filter(|n| !n.is_empty());
        let _guard = self.locks.lock(tenant_id).await;

        let mut exhausted = false;
        let record = self.store.update_tenant(tenant_id, |current| match node_id {
            Some(node) => {
                let mut next = current.unwrap_or_else(|| AttachmentRecord::new(tenant_id));
                match next.generation.checked_add(1) {
                    Some(generation) => {
                        next.generation = generation;
                        next.node_id = Some(node.to_string());
                        next.updated_at = now_secs();
                        Some(next)
                    }
                    None => {
                        exhausted = true;
                        None
                    }
                }
            }
            None => match current {
                Some(mut next) if next.node_id.is_some() => {
                    next.node_id = None;
                    next.updated_at = now_secs();
                    Some(next)
                }
                _ => None,
            },
        })?;

        if exhausted {
            return Err(FencingError::GenerationExhausted(tenant_id.to_string()));
        }

        let generation = record.as_ref().map(|r| r.generation).unwrap_or(0);
        match node_id {
            Some(node) => info!(tenant_id, node_id = node, generation, "tenant attached"),
            None => info!(tenant_id, generation, "tenant detached"),
        }
        Ok(generation)
    }

    /// Current generations of every tenant assigned to `node_id`.
    ///
    /// Called by a storage node on startup. Never issues a generation, so
    /// repeated calls return the same answer.
    pub fn re_attach(&self, node_id: &str) -> FencingResult<Vec<TenantGeneration>> {
        let tenants: Vec<TenantGeneration> = self
            .store
            .list_tenants_for_node(node_id)?
            .into_iter()
            .map(|r| TenantGeneration {
                tenant_id: r.tenant_id,
                generation: r.generation,
            })
            .collect();
        debug!(node_id, count = tenants.len(), "re-attach");
        Ok(tenants)
    }

    /// Whether `generation` is the latest issued for `tenant_id`.
    ///
    /// Unknown tenants and generation 0 never validate.
    pub fn validate(&self, tenant_id: &str, generation: Generation) -> FencingResult<bool> {
        let valid = match self.store.get_tenant(tenant_id)? {
            Some(record) => record.generation != 0 && record.generation == generation,
            None => false,
        };
        if !valid {
            debug!(tenant_id, generation, "stale generation");
        }
        Ok(valid)
    }

    pub fn validate_batch(
        &self,
        tenants: &[TenantGeneration],
    ) -> FencingResult<Vec<ValidationResult>> {
        tenants
            .iter()
            .map(|t| {
                Ok(ValidationResult {
                    tenant_id: t.tenant_id.clone(),
                    valid: self.validate(&t.tenant_id, t.generation)?,
                })
            })
            .collect()
    }

    /// Make the authority aware of a tenant without attaching it.
    ///
    /// Creates the record at generation 0 when absent; an existing record
    /// is returned untouched.
    pub async fn register_tenant(&self, tenant_id: &str) -> FencingResult<AttachmentRecord> {
        let _guard = self.locks.lock(tenant_id).await;
        let record = self.store.update_tenant(tenant_id, |current| match current {
            Some(_) => None,
            None => Some(AttachmentRecord::new(tenant_id)),
        })?;
        // update_tenant always yields a record here: either the existing
        // one or the one just written.
        Ok(record.unwrap_or_else(|| AttachmentRecord::new(tenant_id)))
    }

    pub fn tenant(&self, tenant_id: &str) -> FencingResult<Option<AttachmentRecord>> {
        Ok(self.store.get_tenant(tenant_id)?)
    }

    /// Node currently serving `tenant_id`, if attached.
    pub fn assigned_node(&self, tenant_id: &str) -> FencingResult<Option<NodeId>> {
        Ok(self
            .store
            .get_tenant(tenant_id)?
            .and_then(|record| record.node_id))
    }

    pub fn tenants(&self) -> FencingResult<Vec<AttachmentRecord>> {
        Ok(self.store.list_tenants()?)
    }
}
