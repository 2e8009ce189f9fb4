use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("failed to begin transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("failed to open table: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("failed to commit: {0}")]
    Commit(#[from] redb::CommitError),

    /// A stored value no longer parses; the table was written by an
    /// incompatible version.
    #[error("corrupt {table} record {key}: {source}")]
    Corrupt {
        table: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {table} record: {source}")]
    Encode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
