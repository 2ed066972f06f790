use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use xkcd::errors::ImageError;
use xkcd::services::{TranslationImage, Upload};

use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};

/// Multipart field carrying the file.
const IMAGE_FIELD: &str = "image";

#[derive(Deserialize)]
pub struct DownloadImageRequest {
    pub url: String,
}

pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<TranslationImage>)> {
    let mut handle = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request("MULTIPART_INVALID", e.to_string()))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let filename = field.file_name().unwrap_or_default().to_string();
            let upload = Upload {
                filename,
                body: Box::pin(field),
            };
            // the field borrows the multipart stream, so it is consumed here
            handle = Some(state.ctx.intake().read(Some(upload)).await?);
            break;
        }
    }

    let handle = handle.ok_or(ImageError::EmptyFile)?;
    let image = state.ctx.image_service().create_from_upload(handle).await?;
    info!(image_id = %image.id, "image uploaded");

    Ok((StatusCode::CREATED, Json(image)))
}

pub async fn download_image(
    State(state): State<AppState>,
    Json(payload): Json<DownloadImageRequest>,
) -> ApiResult<(StatusCode, Json<TranslationImage>)> {
    let handle = state.ctx.intake().download(&payload.url).await?;
    let image = state.ctx.image_service().create_from_upload(handle).await?;
    info!(image_id = %image.id, url = %payload.url, "image downloaded");

    Ok((StatusCode::CREATED, Json(image)))
}
