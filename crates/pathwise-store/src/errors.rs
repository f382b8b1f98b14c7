//! Error types for the repository kernel.
//!
//! [`StoreError`] is returned by every store, transaction and repo
//! operation. Driver errors are classified at the boundary so callers can
//! branch on [`ErrorKind`] without inspecting `SQLite` result codes.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during kernel operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A natural tuple or primary key already exists among live rows.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A referenced parent row is missing.
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// A CHECK or NOT NULL constraint failed.
    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    /// Busy/locked database or pool exhaustion. Safe to retry.
    #[error("transient database error: {0}")]
    Transient(String),

    /// The context was canceled or its deadline passed.
    #[error("operation canceled")]
    Canceled,

    /// The caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A row that must exist was not found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// Redacted lookup key.
        key: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        /// Table the row was read from.
        table: &'static str,
        /// Column that failed to decode.
        column: &'static str,
        /// Decoder message.
        detail: String,
    },

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Any other `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
}

/// Convenience type alias for kernel results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Classified error kind, stable across driver versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Dedicated not-found signal (cursor reads).
    NotFound,
    /// Rejected argument.
    InvalidArgument,
    /// Unique constraint.
    UniqueViolation,
    /// Foreign key constraint.
    ForeignKeyViolation,
    /// Check / not-null constraint.
    CheckViolation,
    /// Retryable contention or pool exhaustion.
    Transient,
    /// Token canceled or deadline exceeded.
    Canceled,
    /// Everything else.
    Driver,
}

impl StoreError {
    /// Classified kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UniqueViolation(_) => ErrorKind::UniqueViolation,
            Self::ForeignKeyViolation(_) => ErrorKind::ForeignKeyViolation,
            Self::CheckViolation(_) => ErrorKind::CheckViolation,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Canceled => ErrorKind::Canceled,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::CorruptRow { .. } | Self::Migration { .. } | Self::Sqlite(_) => ErrorKind::Driver,
        }
    }

    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether this is the dedicated not-found signal.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn corrupt(
        table: &'static str,
        column: &'static str,
        detail: impl std::fmt::Display,
    ) -> Self {
        Self::CorruptRow {
            table,
            column,
            detail: detail.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(ffi_err, message) = &err else {
            return Self::Sqlite(err);
        };
        let detail = message.clone().unwrap_or_else(|| ffi_err.to_string());
        match ffi_err.code {
            ErrorCode::ConstraintViolation => match ffi_err.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Self::UniqueViolation(detail),
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Self::ForeignKeyViolation(detail),
                rusqlite::ffi::SQLITE_CONSTRAINT_CHECK | rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => {
                    Self::CheckViolation(detail)
                }
                _ => Self::Sqlite(err),
            },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::Transient(detail),
            ErrorCode::OperationInterrupted => Self::Canceled,
            _ => Self::Sqlite(err),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        Self::Transient(format!("connection pool: {err}"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
