#[derive(Debug, thiserror::Error)]
pub enum MnemonError {
    #[error("content must not be empty")]
    EmptyContent,

    #[error("unknown memory type: {0}")]
    UnknownType(String),

    #[error("importance {0} out of range [0, 1]")]
    ImportanceOutOfRange(f64),

    #[error("days must be non-negative, got {0}")]
    InvalidDays(f64),

    #[error("factor {0} out of range (0, 1]")]
    InvalidFactor(f64),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("schema version {found} is newer than supported version {supported}")]
    Corruption { found: i64, supported: i64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MnemonError {
    /// Whether this error flips the store into degraded read-only mode.
    /// Only hard I/O-level failures qualify; logical errors (constraint
    /// violations, bad queries) do not.
    pub(crate) fn poisons_store(&self) -> bool {
        match self {
            MnemonError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DiskFull
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseCorrupt
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}
