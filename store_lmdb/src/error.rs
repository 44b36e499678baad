use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("corrupted value: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbError> for escrow_store::StoreError {
    fn from(e: LmdbError) -> Self {
        use escrow_store::StoreError;
        match e {
            LmdbError::NotFound(what) => StoreError::NotFound(what),
            LmdbError::Serialization(e) => StoreError::Serialization(e.to_string()),
            LmdbError::Corruption(what) => StoreError::Corruption(what),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
