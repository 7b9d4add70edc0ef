/// Indexer errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] bfx_storage::StorageError),

    #[error("doc counter overflowed u32")]
    DocCounterOverflow,
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
