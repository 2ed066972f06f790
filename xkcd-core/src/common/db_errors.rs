//! Classification of SQLite failures surfaced through sea-orm.
//!
//! The partial unique indexes on `comics` and `translations` back up the
//! services' pre-checks. A request that loses a race past the pre-check ends up
//! here as [`DbErrorKind::UniqueViolation`] and the service turns it into its
//! own conflict error.
//!
//! ```rust
//! use sea_orm::{DbErr, RuntimeErr};
//! use xkcd::common::db_errors::DbErrorKind;
//!
//! let err = DbErr::Query(RuntimeErr::Internal("database is locked".to_string()));
//! assert_eq!(DbErrorKind::from_db_err(&err), DbErrorKind::Busy);
//! assert_eq!(DbErrorKind::Busy.label(), "database busy");
//! ```

use sea_orm::DbErr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    NotFound,
    UniqueViolation,
    ForeignKeyViolation,
    /// Lock contention or pool exhaustion.
    Busy,
    Connection,
    Other,
}

impl DbErrorKind {
    pub fn from_db_err(err: &DbErr) -> Self {
        match err {
            DbErr::RecordNotFound(_) => Self::NotFound,
            DbErr::ConnectionAcquire(_) => Self::Busy,
            DbErr::Conn(_) => Self::Connection,
            DbErr::Exec(_) | DbErr::Query(_) => classify_message(&err.to_string()),
            _ => Self::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Connection)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "record not found",
            Self::UniqueViolation => "unique constraint violated",
            Self::ForeignKeyViolation => "foreign key constraint violated",
            Self::Busy => "database busy",
            Self::Connection => "database connection failed",
            Self::Other => "database error",
        }
    }
}

fn classify_message(message: &str) -> DbErrorKind {
    let message = message.to_lowercase();
    if message.contains("unique constraint failed") || message.contains("duplicate") {
        DbErrorKind::UniqueViolation
    } else if message.contains("foreign key constraint failed") {
        DbErrorKind::ForeignKeyViolation
    } else if message.contains("database is locked") || message.contains("database is busy") {
        DbErrorKind::Busy
    } else {
        DbErrorKind::Other
    }
}

/// True when the error came from one of the unique indexes.
pub fn is_unique_violation(err: &DbErr) -> bool {
    DbErrorKind::from_db_err(err) == DbErrorKind::UniqueViolation
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::RuntimeErr;

    fn exec(message: &str) -> DbErr {
        DbErr::Exec(RuntimeErr::Internal(message.to_string()))
    }

    #[test]
    fn test_unique_index_failure() {
        let err = exec("UNIQUE constraint failed: translations.comic_id, translations.language");
        assert!(is_unique_violation(&err));
        assert!(!DbErrorKind::from_db_err(&err).is_retryable());
    }

    #[test]
    fn test_foreign_key_failure() {
        let err = exec("FOREIGN KEY constraint failed");
        assert_eq!(DbErrorKind::from_db_err(&err), DbErrorKind::ForeignKeyViolation);
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn test_missing_record() {
        let err = DbErr::RecordNotFound("comic 7".to_string());
        assert_eq!(DbErrorKind::from_db_err(&err), DbErrorKind::NotFound);
    }

    #[test]
    fn test_contention_is_retryable() {
        assert!(DbErrorKind::from_db_err(&exec("database is locked")).is_retryable());
        assert!(DbErrorKind::from_db_err(&DbErr::Conn(RuntimeErr::Internal(
            "connection refused".to_string()
        )))
        .is_retryable());
        assert!(!DbErrorKind::from_db_err(&exec("no such table: comics")).is_retryable());
    }
}
