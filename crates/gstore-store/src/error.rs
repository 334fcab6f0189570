use gstore_types::Key;

/// Errors from backing store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An insert targeted a key that already exists.
    #[error("entity already exists: {0}")]
    AlreadyExists(Key),

    /// An update targeted a key that does not exist.
    #[error("entity not found: {0}")]
    NotFound(Key),

    /// A write used an incomplete key where a complete one is required.
    #[error("incomplete key: {0}")]
    IncompleteKey(Key),

    /// The transaction was already committed or rolled back.
    #[error("transaction {0} is closed")]
    TransactionClosed(String),

    /// The transaction was used before `run()` started it.
    #[error("transaction {0} has not been started")]
    TransactionNotStarted(String),

    /// The query cannot be executed by this backend.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Failure reported by the underlying backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// Failure reported by the cache backend.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
