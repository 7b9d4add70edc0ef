/// Retrieval adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("index error: {0}")]
    Index(#[from] bfx_indexer::IndexError),

    #[error("entry content and trigger must be non-empty")]
    EmptyEntry,
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Index(e) => e.is_retryable(),
            _ => false,
        }
    }
}
