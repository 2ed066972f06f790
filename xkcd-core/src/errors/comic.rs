use serde_json::{json, Value};
use thiserror::Error;

use super::common::{db_error_kind, DomainError};
use super::{ErrorKind, TranslationError, ValueError};
use crate::value_objects::{ComicId, IssueNumber};

/// Comic aggregate errors
#[derive(Error, Debug)]
pub enum ComicError {
    #[error("Comic {0} not found")]
    NotFound(ComicId),

    #[error("Comic with issue number {0} not found")]
    NumberNotFound(IssueNumber),

    #[error("Comic with slug '{0}' not found")]
    SlugNotFound(String),

    #[error("A comic with issue number {0} already exists")]
    NumberAlreadyExists(IssueNumber),

    #[error("An extra comic titled '{title}' already exists")]
    ExtraTitleAlreadyExists { title: String, slug: String },

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl DomainError for ComicError {
    fn kind(&self) -> ErrorKind {
        match self {
            ComicError::NotFound(_) | ComicError::NumberNotFound(_) | ComicError::SlugNotFound(_) => {
                ErrorKind::NotFound
            }
            ComicError::NumberAlreadyExists(_) | ComicError::ExtraTitleAlreadyExists { .. } => {
                ErrorKind::Conflict
            }
            ComicError::Value(_) => ErrorKind::InvalidInput,
            ComicError::Translation(err) => err.kind(),
            ComicError::Database(err) => db_error_kind(err),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ComicError::NotFound(_) | ComicError::NumberNotFound(_) | ComicError::SlugNotFound(_) => {
                "COMIC_NOT_FOUND"
            }
            ComicError::NumberAlreadyExists(_) => "COMIC_NUMBER_ALREADY_EXISTS",
            ComicError::ExtraTitleAlreadyExists { .. } => "EXTRA_COMIC_TITLE_ALREADY_EXISTS",
            ComicError::Value(_) => "VALIDATION_FAILED",
            ComicError::Translation(err) => err.error_code(),
            ComicError::Database(_) => "DATABASE_ERROR",
        }
    }

    fn details(&self) -> Value {
        match self {
            ComicError::NotFound(id) => json!({ "comic_id": id }),
            ComicError::NumberNotFound(number) | ComicError::NumberAlreadyExists(number) => {
                json!({ "number": number })
            }
            ComicError::SlugNotFound(slug) => json!({ "slug": slug }),
            ComicError::ExtraTitleAlreadyExists { title, slug } => {
                json!({ "title": title, "slug": slug })
            }
            ComicError::Translation(err) => err.details(),
            _ => Value::Null,
        }
    }
}
