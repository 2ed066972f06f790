//! Image intake and image store errors
//!
//! Intake errors (`EmptyFile`, `SizeLimitExceeded`, `UnsupportedFormat`,
//! `UnreadableImage`) are raised before anything touches the database.
//! Store errors carry the full list of offending ids so a client can react
//! without another lookup.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::common::{db_error_kind, DomainError};
use super::{BrokerError, ErrorKind};
use crate::value_objects::{ImageFormat, ImageId, TranslationId};

/// One image that is already owned by a translation other than the caller's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AttachmentConflict {
    pub translation_id: TranslationId,
    pub image_id: ImageId,
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("The uploaded file is empty")]
    EmptyFile,

    #[error("The uploaded file exceeds the size limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    #[error("Unsupported image format: {}", .format.as_deref().unwrap_or("unknown"))]
    UnsupportedFormat {
        format: Option<String>,
        supported: Vec<ImageFormat>,
    },

    #[error("The image could not be decoded: {0}")]
    UnreadableImage(String),

    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to download image from {url}")]
    DownloadFailed { url: String },

    #[error("Image {0} not found")]
    NotFound(ImageId),

    #[error("Images not found: {image_ids:?}")]
    ManyNotFound { image_ids: Vec<ImageId> },

    #[error("Images are already attached to other translations")]
    AlreadyAttached { conflicts: Vec<AttachmentConflict> },

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl DomainError for ImageError {
    fn kind(&self) -> ErrorKind {
        match self {
            ImageError::EmptyFile
            | ImageError::SizeLimitExceeded { .. }
            | ImageError::UnsupportedFormat { .. }
            | ImageError::UnreadableImage(_)
            | ImageError::InvalidUrl(_) => ErrorKind::InvalidInput,
            ImageError::DownloadFailed { .. } => ErrorKind::Transient,
            ImageError::NotFound(_) | ImageError::ManyNotFound { .. } => ErrorKind::NotFound,
            ImageError::AlreadyAttached { .. } => ErrorKind::Conflict,
            ImageError::Io(_) => ErrorKind::Internal,
            ImageError::Database(err) => db_error_kind(err),
            ImageError::Broker(err) => err.kind(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ImageError::EmptyFile => "EMPTY_FILE",
            ImageError::SizeLimitExceeded { .. } => "SIZE_LIMIT_EXCEEDED",
            ImageError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ImageError::UnreadableImage(_) => "UNREADABLE_IMAGE",
            ImageError::InvalidUrl(_) => "INVALID_URL",
            ImageError::DownloadFailed { .. } => "DOWNLOAD_FAILED",
            ImageError::NotFound(_) | ImageError::ManyNotFound { .. } => "IMAGES_NOT_FOUND",
            ImageError::AlreadyAttached { .. } => "IMAGES_ALREADY_ATTACHED",
            ImageError::Io(_) => "STORAGE_ERROR",
            ImageError::Database(_) => "DATABASE_ERROR",
            ImageError::Broker(err) => err.error_code(),
        }
    }

    fn details(&self) -> Value {
        match self {
            ImageError::SizeLimitExceeded { limit } => json!({ "upload_max_size": limit }),
            ImageError::UnsupportedFormat { format, supported } => json!({
                "invalid_format": format,
                "supported_formats": supported,
            }),
            ImageError::DownloadFailed { url } | ImageError::InvalidUrl(url) => json!({ "url": url }),
            ImageError::NotFound(id) => json!({ "image_ids": [id] }),
            ImageError::ManyNotFound { image_ids } => json!({ "image_ids": image_ids }),
            ImageError::AlreadyAttached { conflicts } => json!({ "conflicts": conflicts }),
            _ => Value::Null,
        }
    }
}
