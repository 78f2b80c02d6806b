use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The phone claimed during identity resolution already belongs to a
    /// different account.
    #[error("Phone number already belongs to another account")]
    PhoneTaken,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
