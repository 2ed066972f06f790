use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use xkcd::services::{Translation, TranslationRequest};
use xkcd::value_objects::{ComicId, Language, TranslationId};

use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ListTranslationsQuery {
    pub language: Option<Language>,
    pub include_drafts: bool,
}

pub async fn create_translation(
    State(state): State<AppState>,
    Path(comic_id): Path<ComicId>,
    Json(payload): Json<TranslationRequest>,
) -> ApiResult<(StatusCode, Json<Translation>)> {
    let service = state.ctx.translation_service();
    let id = service.create(comic_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(service.get_by_id(id).await?)))
}

pub async fn list_translations(
    State(state): State<AppState>,
    Path(comic_id): Path<ComicId>,
    Query(query): Query<ListTranslationsQuery>,
) -> ApiResult<Json<Vec<Translation>>> {
    let translations = state
        .ctx
        .translation_service()
        .list_for_comic(comic_id, query.language.as_ref(), query.include_drafts)
        .await?;
    Ok(Json(translations))
}

pub async fn get_translation_by_language(
    State(state): State<AppState>,
    Path((comic_id, language)): Path<(ComicId, Language)>,
) -> ApiResult<Json<Translation>> {
    let translation = state
        .ctx
        .translation_service()
        .get_by_language(comic_id, &language)
        .await?;
    Ok(Json(translation))
}

pub async fn get_translation(
    State(state): State<AppState>,
    Path(id): Path<TranslationId>,
) -> ApiResult<Json<Translation>> {
    Ok(Json(state.ctx.translation_service().get_by_id(id).await?))
}

pub async fn update_translation(
    State(state): State<AppState>,
    Path(id): Path<TranslationId>,
    Json(payload): Json<TranslationRequest>,
) -> ApiResult<Json<Translation>> {
    let service = state.ctx.translation_service();
    service.update(id, &payload).await?;
    Ok(Json(service.get_by_id(id).await?))
}

pub async fn delete_translation(
    State(state): State<AppState>,
    Path(id): Path<TranslationId>,
) -> ApiResult<StatusCode> {
    state.ctx.translation_service().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_translation(
    State(state): State<AppState>,
    Path(id): Path<TranslationId>,
) -> ApiResult<Json<Translation>> {
    let service = state.ctx.translation_service();
    service.publish(id).await?;
    Ok(Json(service.get_by_id(id).await?))
}

pub async fn get_raw_transcript(
    State(state): State<AppState>,
    Path(id): Path<TranslationId>,
) -> ApiResult<impl IntoResponse> {
    let transcript = state.ctx.translation_service().get_raw_transcript(id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        transcript,
    ))
}
