use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("duplicate event: {0}")]
    Duplicate(String),
    #[error("row not found: {0}")]
    NotFound(i64),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    #[error("mutex poisoned")]
    MutexPoisoned,
}
