/// Storage-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is read-only")]
    ReadOnly,

    #[error("key not found")]
    NotFound,

    #[error("corrupt posting record: {reason}")]
    Corrupt { reason: String },

    #[error("schema version mismatch: expected {expected}, found {actual}")]
    SchemaMismatch { expected: u32, actual: u32 },
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sqlite(e) if is_sqlite_busy(e))
    }
}

fn is_sqlite_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy,
                ..
            },
            _
        )
    )
}
