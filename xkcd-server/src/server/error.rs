use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, warn};

use xkcd::errors::{DomainError, ErrorKind};

/// JSON error response: `{ "code", "message", "details" }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Value,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<E> From<E> for ApiError
where
    E: DomainError + Display,
{
    fn from(err: E) -> Self {
        let kind = err.kind();
        match kind {
            ErrorKind::Internal => error!(code = err.error_code(), "request failed: {}", err),
            ErrorKind::Transient => warn!(code = err.error_code(), "request failed: {}", err),
            _ => {}
        }

        // internal details never leave the process
        let message = match kind {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => err.to_string(),
        };

        Self {
            status: status_for(kind),
            code: err.error_code(),
            message,
            details: err.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code,
            "message": self.message,
            "details": self.details,
        });
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use xkcd::errors::{ImageError, TranslationError};
    use xkcd::value_objects::ImageId;

    #[test]
    fn test_kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Transient), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_domain_error_keeps_code_and_details() {
        let err: ApiError = TranslationError::from(ImageError::ManyNotFound {
            image_ids: vec![ImageId::new(4).unwrap()],
        })
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "IMAGES_NOT_FOUND");
        assert_eq!(err.details, json!({ "image_ids": [4] }));
    }

    #[test]
    fn test_internal_message_is_hidden() {
        let err: ApiError = ImageError::Io(std::io::Error::other("disk on fire")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }
}
