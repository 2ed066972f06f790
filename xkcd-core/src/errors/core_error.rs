use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;

use crate::common::db_errors::DbErrorKind;

/// Transport-independent error categories.
///
/// The presentation layer is the only place these are turned into status codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    /// Upstream or infrastructure failure that may succeed on retry.
    Transient,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Error carrier for failures outside the comic, translation and image domains
/// (unknown routes, raw database failures).
#[derive(Debug)]
pub struct CoreError {
    kind: ErrorKind,
    message: String,
    fields: BTreeMap<String, String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: BTreeMap::new(),
            source: None,
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::NotFound, "Resource not found");
        err.fields.insert("entity".to_string(), entity.into());
        err.fields.insert("id".to_string(), id.into());
        err
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Empty unless the constructor recorded identifying fields.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<sea_orm::DbErr> for CoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        let db_kind = DbErrorKind::from_db_err(&err);
        let kind = if db_kind.is_retryable() {
            ErrorKind::Transient
        } else {
            ErrorKind::Internal
        };
        CoreError::new(kind, db_kind.label()).with_source(err)
    }
}
