//! redb table definitions.

use redb::TableDefinition;

/// Attachment records keyed by `{tenant_id}`.
pub const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");

/// Timeline records keyed by `(tenant_id, timeline_id)`. Ids are opaque,
/// so the two parts are never joined into one string.
pub const TIMELINES: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("timelines");
