use axum::http::Uri;

use xkcd::errors::CoreError;

use crate::server::error::ApiError;

/// Unknown routes answer with the same JSON error shape as the API.
pub async fn route_not_found(uri: Uri) -> ApiError {
    CoreError::not_found("Route", uri.path()).into()
}
