use thiserror::Error;

/// Errors that can occur when interacting with the participant stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same unique key already exists.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// The record addressed by an update does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A stored value could not be mapped back into the domain model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The session cache could not be reached.
    #[error("Session cache error: {0}")]
    Cache(#[from] redis::RedisError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether the failed call is known to have written nothing.
    ///
    /// A constraint violation or a missing row means the statement did not
    /// apply. Connection, cache and row-mapping errors leave the write in an
    /// unknown state.
    pub fn is_definite(&self) -> bool {
        matches!(self, StoreError::Duplicate(_) | StoreError::NotFound(_))
    }
}
