use serde_json::{json, Value};
use thiserror::Error;

use super::common::{db_error_kind, DomainError};
use super::{ErrorKind, ImageError, ValueError};
use crate::value_objects::{ComicId, Language, TranslationId};

/// Translation management errors
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("Translation {0} not found")]
    NotFound(TranslationId),

    #[error("No published {language} translation for comic {comic_id}")]
    LanguageNotFound {
        comic_id: ComicId,
        language: Language,
    },

    #[error("Comic {0} not found")]
    ComicNotFound(ComicId),

    #[error("A published {language} translation already exists for comic {comic_id}")]
    AlreadyExists {
        comic_id: ComicId,
        language: Language,
    },

    #[error("Translation {0} is already published")]
    AlreadyPublished(TranslationId),

    /// The original translation is created with its comic and dies with it.
    #[error("Operations on the original translation are forbidden")]
    OriginalOperationForbidden,

    #[error("Translation {0} cannot change its draft status on update, publish it instead")]
    DraftStatusChangeForbidden(TranslationId),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl DomainError for TranslationError {
    fn kind(&self) -> ErrorKind {
        match self {
            TranslationError::NotFound(_)
            | TranslationError::LanguageNotFound { .. }
            | TranslationError::ComicNotFound(_) => ErrorKind::NotFound,
            TranslationError::AlreadyExists { .. } | TranslationError::AlreadyPublished(_) => {
                ErrorKind::Conflict
            }
            TranslationError::OriginalOperationForbidden
            | TranslationError::DraftStatusChangeForbidden(_)
            | TranslationError::Value(_) => ErrorKind::InvalidInput,
            TranslationError::Image(err) => err.kind(),
            TranslationError::Database(err) => db_error_kind(err),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            TranslationError::NotFound(_) | TranslationError::LanguageNotFound { .. } => {
                "TRANSLATION_NOT_FOUND"
            }
            TranslationError::ComicNotFound(_) => "COMIC_NOT_FOUND",
            TranslationError::AlreadyExists { .. } => "TRANSLATION_ALREADY_EXISTS",
            TranslationError::AlreadyPublished(_) => "TRANSLATION_ALREADY_PUBLISHED",
            TranslationError::OriginalOperationForbidden => "ORIGINAL_TRANSLATION_FORBIDDEN",
            TranslationError::DraftStatusChangeForbidden(_) => "DRAFT_STATUS_CHANGE_FORBIDDEN",
            TranslationError::Value(_) => "VALIDATION_FAILED",
            TranslationError::Image(err) => err.error_code(),
            TranslationError::Database(_) => "DATABASE_ERROR",
        }
    }

    fn details(&self) -> Value {
        match self {
            TranslationError::NotFound(id)
            | TranslationError::AlreadyPublished(id)
            | TranslationError::DraftStatusChangeForbidden(id) => json!({ "translation_id": id }),
            TranslationError::LanguageNotFound { comic_id, language }
            | TranslationError::AlreadyExists { comic_id, language } => json!({
                "comic_id": comic_id,
                "language": language,
            }),
            TranslationError::ComicNotFound(id) => json!({ "comic_id": id }),
            TranslationError::Image(err) => err.details(),
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists() {
        let err = TranslationError::AlreadyExists {
            comic_id: ComicId::new(42).unwrap(),
            language: Language::new("ru").unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "A published RU translation already exists for comic 42"
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.details(), json!({ "comic_id": 42, "language": "RU" }));
    }

    #[test]
    fn test_image_errors_keep_their_kind() {
        let err: TranslationError = ImageError::ManyNotFound {
            image_ids: vec![crate::value_objects::ImageId::new(8).unwrap()],
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.error_code(), "IMAGES_NOT_FOUND");
        assert_eq!(err.details(), json!({ "image_ids": [8] }));
    }

    #[test]
    fn test_original_forbidden_is_invalid_input() {
        let err = TranslationError::OriginalOperationForbidden;
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
