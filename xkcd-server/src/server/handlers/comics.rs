use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use xkcd::services::{
    ComicFilter, ComicOrderBy, ComicRequest, ComicWithTranslations, OriginalTranslationRequest,
    Pagination, SortOrder, TagCombination,
};
use xkcd::value_objects::{ComicId, IssueNumber};

use crate::server::app::AppState;
use crate::server::error::ApiResult;

/// Comic fields plus the content of its original translation.
#[derive(Deserialize)]
pub struct ComicPayload {
    #[serde(flatten)]
    pub comic: ComicRequest,
    pub original: OriginalTranslationRequest,
}

/// Query string form of [`ComicFilter`] and [`Pagination`]; `tags` is comma separated.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ListComicsQuery {
    pub search: Option<String>,
    pub tags: Option<String>,
    pub tag_combination: TagCombination,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub order_by: ComicOrderBy,
    pub order: SortOrder,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListComicsQuery {
    fn into_parts(self) -> (ComicFilter, Pagination) {
        let tags = self
            .tags
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let defaults = Pagination::default();
        let filter = ComicFilter {
            search: self.search,
            tags,
            tag_combination: self.tag_combination,
            date_from: self.date_from,
            date_to: self.date_to,
            order_by: self.order_by,
            order: self.order,
        };
        let pagination = Pagination {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        };
        (filter, pagination)
    }
}

#[derive(Serialize)]
pub struct ComicPage {
    pub total: u64,
    pub items: Vec<ComicWithTranslations>,
}

pub async fn list_comics(
    State(state): State<AppState>,
    Query(query): Query<ListComicsQuery>,
) -> ApiResult<Json<ComicPage>> {
    let (filter, pagination) = query.into_parts();
    let (total, items) = state.ctx.comic_service().get_list(&filter, pagination).await?;
    Ok(Json(ComicPage { total, items }))
}

pub async fn create_comic(
    State(state): State<AppState>,
    Json(payload): Json<ComicPayload>,
) -> ApiResult<(StatusCode, Json<ComicWithTranslations>)> {
    let service = state.ctx.comic_service();
    let (comic_id, _) = service.create(&payload.comic, &payload.original).await?;
    let comic = service.get_by_id(comic_id).await?;
    Ok((StatusCode::CREATED, Json(comic)))
}

pub async fn get_comic(
    State(state): State<AppState>,
    Path(id): Path<ComicId>,
) -> ApiResult<Json<ComicWithTranslations>> {
    Ok(Json(state.ctx.comic_service().get_by_id(id).await?))
}

pub async fn update_comic(
    State(state): State<AppState>,
    Path(id): Path<ComicId>,
    Json(payload): Json<ComicPayload>,
) -> ApiResult<Json<ComicWithTranslations>> {
    let service = state.ctx.comic_service();
    service.update(id, &payload.comic, &payload.original).await?;
    Ok(Json(service.get_by_id(id).await?))
}

pub async fn delete_comic(
    State(state): State<AppState>,
    Path(id): Path<ComicId>,
) -> ApiResult<StatusCode> {
    state.ctx.comic_service().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_comic_by_number(
    State(state): State<AppState>,
    Path(number): Path<IssueNumber>,
) -> ApiResult<Json<ComicWithTranslations>> {
    Ok(Json(state.ctx.comic_service().get_by_number(number).await?))
}

pub async fn get_comic_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ComicWithTranslations>> {
    Ok(Json(state.ctx.comic_service().get_by_slug(&slug).await?))
}

pub async fn latest_number(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let number = state.ctx.comic_service().get_latest_issue_number().await?;
    Ok(Json(json!({ "number": number })))
}
