//! Shared error plumbing
//!
//! Every domain error implements [`DomainError`], which is what the presentation
//! layer consumes: a category, a stable machine-readable code and the identifying
//! fields of the failure.

use serde_json::Value;

use super::ErrorKind;
use crate::common::db_errors::DbErrorKind;

pub trait DomainError: std::error::Error {
    fn kind(&self) -> ErrorKind;

    /// Stable code for API responses (`TRANSLATION_ALREADY_EXISTS`, ...)
    fn error_code(&self) -> &'static str;

    /// Identifying fields of the failure, `Null` when there are none.
    fn details(&self) -> Value {
        Value::Null
    }
}

/// Category for a raw database error that escaped the domain checks.
pub fn db_error_kind(err: &sea_orm::DbErr) -> ErrorKind {
    match DbErrorKind::from_db_err(err) {
        DbErrorKind::NotFound => ErrorKind::NotFound,
        DbErrorKind::UniqueViolation => ErrorKind::Conflict,
        DbErrorKind::Busy | DbErrorKind::Connection => ErrorKind::Transient,
        DbErrorKind::ForeignKeyViolation | DbErrorKind::Other => ErrorKind::Internal,
    }
}

impl DomainError for super::CoreError {
    fn kind(&self) -> ErrorKind {
        super::CoreError::kind(self)
    }

    fn error_code(&self) -> &'static str {
        match super::CoreError::kind(self) {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::InvalidInput => "VALIDATION_FAILED",
            ErrorKind::Transient => "SERVICE_UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Value {
        if self.fields().is_empty() {
            return Value::Null;
        }
        serde_json::to_value(self.fields()).unwrap_or(Value::Null)
    }
}

impl DomainError for super::ValueError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }

    fn error_code(&self) -> &'static str {
        "VALIDATION_FAILED"
    }
}
