use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("no field map registered for source key '{0}'")]
    UnknownSourceKey(String),

    #[error("invalid field map: {0}")]
    InvalidFieldMap(String),

    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] kgstore::StorageError),
}

pub type Result<T> = std::result::Result<T, FetcherError>;
