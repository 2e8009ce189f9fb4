//! StateStore — redb-backed persistence for attachments and timelines.
//!
//! Supports both on-disk and in-memory backends (the latter for tests).
//! Every attachment mutation is a read-modify-write inside one write
//! transaction; readers see committed snapshots only.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

fn decode<T: DeserializeOwned>(table: &'static str, key: &str, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|source| StateError::Corrupt {
        table,
        key: key.to_string(),
        source,
    })
}

fn encode<T: Serialize>(table: &'static str, value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| StateError::Encode { table, source })
}

#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write()?;
        txn.open_table(TENANTS)?;
        txn.open_table(TIMELINES)?;
        txn.commit()?;
        Ok(())
    }

    // ── Tenants ────────────────────────────────────────────────────

    pub fn get_tenant(&self, tenant_id: &str) -> StateResult<Option<AttachmentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TENANTS)?;
        match table.get(tenant_id)? {
            Some(guard) => Ok(Some(decode("tenants", tenant_id, guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all attachment records, ordered by tenant id.
    pub fn list_tenants(&self) -> StateResult<Vec<AttachmentRecord>> {
        self.scan_tenants(|_| true)
    }

    /// Records currently assigned to `node_id`, ordered by tenant id.
    pub fn list_tenants_for_node(&self, node_id: &str) -> StateResult<Vec<AttachmentRecord>> {
        self.scan_tenants(|record| record.is_attached_to(node_id))
    }

    fn scan_tenants(
        &self,
        keep: impl Fn(&AttachmentRecord) -> bool,
    ) -> StateResult<Vec<AttachmentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TENANTS)?;
        let mut results = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let record: AttachmentRecord = decode("tenants", key.value(), value.value())?;
            if keep(&record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Atomically read, transform and write one attachment record.
    ///
    /// `f` receives the current record (if any). Returning `Some` stores the
    /// new record; returning `None` leaves the table untouched. The result
    /// is the record as it stands after the transaction.
    pub fn update_tenant<F>(&self, tenant_id: &str, f: F) -> StateResult<Option<AttachmentRecord>>
    where
        F: FnOnce(Option<AttachmentRecord>) -> Option<AttachmentRecord>,
    {
        let txn = self.db.begin_write()?;
        let result;
        {
            let mut table = txn.open_table(TENANTS)?;
            let current: Option<AttachmentRecord> = match table.get(tenant_id)? {
                Some(guard) => Some(decode("tenants", tenant_id, guard.value())?),
                None => None,
            };
            match f(current.clone()) {
                Some(next) => {
                    let value = encode("tenants", &next)?;
                    table.insert(tenant_id, value.as_slice())?;
                    result = Some(next);
                }
                None => result = current,
            }
        }
        txn.commit()?;
        Ok(result)
    }

    // ── Timelines ──────────────────────────────────────────────────

    /// Insert or update a timeline record.
    pub fn put_timeline(&self, record: &TimelineRecord) -> StateResult<()> {
        let value = encode("timelines", record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TIMELINES)?;
            table.insert(record.key(), value.as_slice())?;
        }
        txn.commit()?;
        debug!(
            tenant_id = %record.tenant_id,
            timeline_id = %record.timeline_id,
            "timeline stored"
        );
        Ok(())
    }

    pub fn get_timeline(
        &self,
        tenant_id: &str,
        timeline_id: &str,
    ) -> StateResult<Option<TimelineRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TIMELINES)?;
        match table.get((tenant_id, timeline_id))? {
            Some(guard) => Ok(Some(decode(
                "timelines",
                &timeline_label(tenant_id, timeline_id),
                guard.value(),
            )?)),
            None => Ok(None),
        }
    }

    /// Timelines of exactly `tenant_id`, ordered by timeline id.
    pub fn list_timelines_for_tenant(&self, tenant_id: &str) -> StateResult<Vec<TimelineRecord>> {
        self.scan_timelines(|(tenant, _), _| tenant == tenant_id)
    }

    /// Timeline bound to the given compute node, if any.
    pub fn find_timeline_by_compute(&self, compute_id: &str) -> StateResult<Option<TimelineRecord>> {
        let mut found =
            self.scan_timelines(|_, record| record.compute_id.as_deref() == Some(compute_id))?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    fn scan_timelines(
        &self,
        keep: impl Fn((&str, &str), &TimelineRecord) -> bool,
    ) -> StateResult<Vec<TimelineRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TIMELINES)?;
        let mut results = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let (tenant, timeline) = key.value();
            let record: TimelineRecord =
                decode("timelines", &timeline_label(tenant, timeline), value.value())?;
            if keep((tenant, timeline), &record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Delete a timeline record. Returns true if it existed.
    pub fn delete_timeline(&self, tenant_id: &str, timeline_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write()?;
        let existed;
        {
            let mut table = txn.open_table(TIMELINES)?;
            existed = table.remove((tenant_id, timeline_id))?.is_some();
        }
        txn.commit()?;
        debug!(tenant_id, timeline_id, existed, "timeline deleted");
        Ok(existed)
    }
}
