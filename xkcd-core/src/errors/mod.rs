//! Domain-specific error types for xkcd-core
//!
//! # Error Categories
//!
//! - **ImageError**: intake (empty, oversize, unsupported, download) and image store
//!   (missing ids, attachment conflicts)
//! - **TranslationError**: translation lifecycle (drafts, publishing, original language)
//! - **ComicError**: comic aggregate (issue number / slug uniqueness, lookups)
//! - **BrokerError**: durable message storage
//! - **ConfigError**: settings file and environment overrides
//!
//! All of them map onto one [`ErrorKind`] through [`DomainError`].
//!
//! ```rust
//! use xkcd::errors::{DomainError, ErrorKind, ImageError};
//!
//! let err = ImageError::EmptyFile;
//! assert_eq!(err.kind(), ErrorKind::InvalidInput);
//! assert_eq!(err.error_code(), "EMPTY_FILE");
//! ```

pub mod broker;
pub mod comic;
pub mod common;
pub mod config;
pub mod core_error;
pub mod image;
pub mod translation;
pub mod value;

pub use broker::BrokerError;
pub use comic::ComicError;
pub use common::DomainError;
pub use config::ConfigError;
pub use core_error::{CoreError, ErrorKind};
pub use image::{AttachmentConflict, ImageError};
pub use translation::TranslationError;
pub use value::ValueError;

pub type ImageResult<T> = Result<T, ImageError>;

pub type TranslationResult<T> = Result<T, TranslationError>;

pub type ComicResult<T> = Result<T, ComicError>;

pub type BrokerResult<T> = Result<T, BrokerError>;
