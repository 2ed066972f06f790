use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use sea_orm::sea_query::{Expr, LikeExpr, OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel, ModelTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::broker::{ComicCreated, Publisher};
use crate::common::db_errors::is_unique_violation;
use crate::common::slugify;
use crate::database::entities::{comic_tags, comics, tags, translations};
use crate::errors::{ComicError, ComicResult, TranslationError};
use crate::services::translation_image_service::TranslationImageService;
use crate::services::translation_service::{Translation, TranslationRequest, TranslationService};
use crate::value_objects::{ComicId, ImageId, IssueNumber, Language, TagName, TranslationId};

pub const DEFAULT_PAGE_LIMIT: u64 = 100;

#[derive(Clone, Debug, Deserialize)]
pub struct ComicRequest {
    /// Absent for extra comics.
    #[serde(default)]
    pub number: Option<IssueNumber>,
    pub publication_date: NaiveDate,
    #[serde(default)]
    pub explain_url: Option<String>,
    #[serde(default)]
    pub click_url: Option<String>,
    #[serde(default)]
    pub is_interactive: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Content of the original translation. It is always in the original language
/// and always published.
#[derive(Clone, Debug, Deserialize)]
pub struct OriginalTranslationRequest {
    pub title: String,
    #[serde(default)]
    pub tooltip: String,
    #[serde(default)]
    pub raw_transcript: String,
    #[serde(default)]
    pub translator_comment: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub image_ids: Vec<ImageId>,
}

impl OriginalTranslationRequest {
    pub fn to_translation_request(&self) -> TranslationRequest {
        TranslationRequest {
            language: Language::original(),
            title: self.title.clone(),
            tooltip: self.tooltip.clone(),
            raw_transcript: self.raw_transcript.clone(),
            translator_comment: self.translator_comment.clone(),
            source_url: self.source_url.clone(),
            image_ids: self.image_ids.clone(),
            is_draft: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comic {
    pub id: ComicId,
    pub number: Option<IssueNumber>,
    pub slug: String,
    pub publication_date: NaiveDate,
    pub explain_url: Option<String>,
    pub click_url: Option<String>,
    pub is_interactive: bool,
    pub tags: Vec<String>,
}

/// A comic with its translations split by role.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComicWithTranslations {
    #[serde(flatten)]
    pub comic: Comic,
    pub original: Translation,
    /// Published translations other than the original.
    pub translations: Vec<Translation>,
    pub drafts: Vec<Translation>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCombination {
    And,
    #[default]
    Or,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComicOrderBy {
    #[default]
    Number,
    PublicationDate,
    Id,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ComicFilter {
    /// Substring matched against the published translations' searchable text.
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub tag_combination: TagCombination,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub order_by: ComicOrderBy,
    pub order: SortOrder,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// The comic aggregate: comic row, tag set and the mandatory original translation.
#[derive(Clone)]
pub struct ComicService {
    db: DatabaseConnection,
    publisher: Publisher,
}

impl ComicService {
    pub fn new(db: DatabaseConnection, publisher: Publisher) -> Self {
        Self { db, publisher }
    }

    /// Creates the comic, its tags and its original translation in one transaction.
    pub async fn create(
        &self,
        request: &ComicRequest,
        original: &OriginalTranslationRequest,
    ) -> ComicResult<(ComicId, TranslationId)> {
        let tag_names = validate_tags(&request.tags)?;
        let slug = slugify(&original.title);

        let txn = self.db.begin().await?;

        Self::ensure_unique(&txn, request.number, &original.title, &slug, None).await?;

        let mut comic = comics::ActiveModel::new();
        comic.number = Set(request.number.map(|number| number.value()));
        comic.slug = Set(slug.clone());
        comic.publication_date = Set(request.publication_date);
        comic.explain_url = Set(request.explain_url.clone());
        comic.click_url = Set(request.click_url.clone());
        comic.is_interactive = Set(request.is_interactive);

        let model = comic
            .insert(&txn)
            .await
            .map_err(|err| conflict_on_unique(err, request.number, &original.title, &slug))?;
        let comic_id = ComicId::from_db(model.id);

        Self::replace_tags(&txn, comic_id, &tag_names).await?;

        let translation_id =
            TranslationService::insert(&txn, comic_id, &original.to_translation_request()).await?;

        txn.commit().await?;
        info!(comic_id = %comic_id, number = ?request.number, slug = %slug, "comic created");

        let message = ComicCreated {
            comic_id,
            number: request.number,
        };
        if let Err(err) = self.publisher.publish(&message).await {
            warn!(comic_id = %comic_id, error = %err, "failed to announce new comic");
        }

        Ok((comic_id, translation_id))
    }

    /// Replaces scalar fields, the tag set and the original translation.
    pub async fn update(
        &self,
        comic_id: ComicId,
        request: &ComicRequest,
        original: &OriginalTranslationRequest,
    ) -> ComicResult<()> {
        let tag_names = validate_tags(&request.tags)?;
        let slug = slugify(&original.title);

        let txn = self.db.begin().await?;

        let model = Self::find_model(&txn, comic_id).await?;
        Self::ensure_unique(&txn, request.number, &original.title, &slug, Some(comic_id)).await?;

        let mut comic = model.into_active_model().set_updated_at();
        comic.number = Set(request.number.map(|number| number.value()));
        comic.slug = Set(slug.clone());
        comic.publication_date = Set(request.publication_date);
        comic.explain_url = Set(request.explain_url.clone());
        comic.click_url = Set(request.click_url.clone());
        comic.is_interactive = Set(request.is_interactive);
        comic
            .update(&txn)
            .await
            .map_err(|err| conflict_on_unique(err, request.number, &original.title, &slug))?;

        Self::replace_tags(&txn, comic_id, &tag_names).await?;

        let original_language = Language::original();
        let original_model = translations::Entity::find()
            .filter(translations::Column::ComicId.eq(comic_id.value()))
            .filter(translations::Column::Language.eq(original_language.as_str()))
            .filter(translations::Column::IsDraft.eq(false))
            .one(&txn)
            .await?
            .ok_or(TranslationError::LanguageNotFound {
                comic_id,
                language: original_language,
            })?;
        TranslationService::update_in(
            &txn,
            TranslationId::from_db(original_model.id),
            &original.to_translation_request(),
        )
        .await?;

        txn.commit().await?;
        info!(comic_id = %comic_id, "comic updated");
        Ok(())
    }

    /// Deletes the comic and its translations. Images are detached, never deleted.
    pub async fn delete(&self, comic_id: ComicId) -> ComicResult<()> {
        let txn = self.db.begin().await?;

        let model = Self::find_model(&txn, comic_id).await?;

        let translation_ids: Vec<i32> = translations::Entity::find()
            .select_only()
            .column(translations::Column::Id)
            .filter(translations::Column::ComicId.eq(comic_id.value()))
            .into_tuple()
            .all(&txn)
            .await?;
        let detached = TranslationImageService::detach_all(&txn, &translation_ids)
            .await
            .map_err(TranslationError::from)?;

        model.delete(&txn).await?;
        txn.commit().await?;

        info!(comic_id = %comic_id, translations = translation_ids.len(), detached, "comic deleted");
        Ok(())
    }

    pub async fn get_by_id(&self, comic_id: ComicId) -> ComicResult<ComicWithTranslations> {
        let model = Self::find_model(&self.db, comic_id).await?;
        self.load_one(model).await
    }

    pub async fn get_by_number(&self, number: IssueNumber) -> ComicResult<ComicWithTranslations> {
        let model = comics::Entity::find()
            .filter(comics::Column::Number.eq(number.value()))
            .one(&self.db)
            .await?
            .ok_or(ComicError::NumberNotFound(number))?;
        self.load_one(model).await
    }

    /// Looks up an extra comic by its slug.
    pub async fn get_by_slug(&self, slug: &str) -> ComicResult<ComicWithTranslations> {
        let model = comics::Entity::find()
            .filter(comics::Column::Slug.eq(slug))
            .filter(comics::Column::Number.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| ComicError::SlugNotFound(slug.to_string()))?;
        self.load_one(model).await
    }

    /// Filtered, ordered page of comics plus the total number of matches.
    pub async fn get_list(
        &self,
        filter: &ComicFilter,
        pagination: Pagination,
    ) -> ComicResult<(u64, Vec<ComicWithTranslations>)> {
        let mut query = comics::Entity::find();

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let matching = Query::select()
                .column(translations::Column::ComicId)
                .from(translations::Entity)
                .and_where(
                    Expr::col((translations::Entity, translations::Column::SearchableText))
                        .like(LikeExpr::new(contains_pattern(search)).escape('\\')),
                )
                .and_where(translations::Column::IsDraft.eq(false))
                .to_owned();
            query = query.filter(comics::Column::Id.in_subquery(matching));
        }

        let tag_names = validate_tags(&filter.tags)?;
        if !tag_names.is_empty() {
            let mut tagged = Query::select();
            tagged
                .column((comic_tags::Entity, comic_tags::Column::ComicId))
                .from(comic_tags::Entity)
                .inner_join(
                    tags::Entity,
                    Expr::col((tags::Entity, tags::Column::Id))
                        .equals((comic_tags::Entity, comic_tags::Column::TagId)),
                )
                .and_where(
                    Expr::col((tags::Entity, tags::Column::Name))
                        .is_in(tag_names.iter().map(|name| name.as_str().to_string())),
                );
            if filter.tag_combination == TagCombination::And {
                tagged
                    .group_by_col((comic_tags::Entity, comic_tags::Column::ComicId))
                    .and_having(
                        Expr::expr(Expr::col((comic_tags::Entity, comic_tags::Column::TagId)).count())
                            .eq(tag_names.len() as i64),
                    );
            }
            query = query.filter(comics::Column::Id.in_subquery(tagged.to_owned()));
        }

        if let Some(from) = filter.date_from {
            query = query.filter(comics::Column::PublicationDate.gte(from));
        }
        if let Some(to) = filter.date_to {
            query = query.filter(comics::Column::PublicationDate.lte(to));
        }

        let order = match filter.order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        query = match filter.order_by {
            ComicOrderBy::Number => query.order_by(comics::Column::Number, order.clone()),
            ComicOrderBy::PublicationDate => {
                query.order_by(comics::Column::PublicationDate, order.clone())
            }
            ComicOrderBy::Id => query,
        };
        query = query.order_by(comics::Column::Id, order);

        let total = query.clone().count(&self.db).await?;
        let models = query
            .limit(pagination.limit)
            .offset(pagination.offset)
            .all(&self.db)
            .await?;

        let items = self.load_many(models).await?;
        Ok((total, items))
    }

    /// Highest assigned issue number, `None` when only extras exist.
    pub async fn get_latest_issue_number(&self) -> ComicResult<Option<IssueNumber>> {
        let latest: Option<Option<i32>> = comics::Entity::find()
            .select_only()
            .column_as(comics::Column::Number.max(), "latest")
            .into_tuple()
            .one(&self.db)
            .await?;
        Ok(latest.flatten().map(IssueNumber::from_db))
    }

    async fn load_one(&self, model: comics::Model) -> ComicResult<ComicWithTranslations> {
        let id = ComicId::from_db(model.id);
        self.load_many(vec![model])
            .await?
            .pop()
            .ok_or(ComicError::NotFound(id))
    }

    /// Loads tags and translations for a page of comics in a fixed number of queries.
    async fn load_many(&self, models: Vec<comics::Model>) -> ComicResult<Vec<ComicWithTranslations>> {
        let ids: Vec<i32> = models.iter().map(|model| model.id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tags_by_comic: HashMap<i32, Vec<String>> = HashMap::new();
        let tag_rows: Vec<(i32, String)> = comic_tags::Entity::find()
            .select_only()
            .column(comic_tags::Column::ComicId)
            .column(tags::Column::Name)
            .inner_join(tags::Entity)
            .filter(comic_tags::Column::ComicId.is_in(ids.clone()))
            .order_by_asc(tags::Column::Name)
            .into_tuple()
            .all(&self.db)
            .await?;
        for (comic_id, name) in tag_rows {
            tags_by_comic.entry(comic_id).or_default().push(name);
        }

        let translation_models = translations::Entity::find()
            .filter(translations::Column::ComicId.is_in(ids))
            .order_by_asc(translations::Column::Id)
            .all(&self.db)
            .await?;
        let mut translations_by_comic: HashMap<ComicId, Vec<Translation>> = HashMap::new();
        for translation in TranslationService::with_images(&self.db, translation_models).await? {
            translations_by_comic
                .entry(translation.comic_id)
                .or_default()
                .push(translation);
        }

        models
            .into_iter()
            .map(|model| {
                let comic_id = ComicId::from_db(model.id);
                let all = translations_by_comic.remove(&comic_id).unwrap_or_default();
                let tags = tags_by_comic.remove(&model.id).unwrap_or_default();
                assemble(model, tags, all)
            })
            .collect()
    }

    async fn find_model<C: ConnectionTrait>(conn: &C, comic_id: ComicId) -> ComicResult<comics::Model> {
        comics::Entity::find_by_id(comic_id.value())
            .one(conn)
            .await?
            .ok_or(ComicError::NotFound(comic_id))
    }

    /// Numbered comics are unique by number, extras by slug.
    async fn ensure_unique<C: ConnectionTrait>(
        conn: &C,
        number: Option<IssueNumber>,
        title: &str,
        slug: &str,
        exclude: Option<ComicId>,
    ) -> ComicResult<()> {
        let mut condition = Condition::all();
        condition = match number {
            Some(number) => condition.add(comics::Column::Number.eq(number.value())),
            None => condition
                .add(comics::Column::Number.is_null())
                .add(comics::Column::Slug.eq(slug)),
        };
        if let Some(exclude) = exclude {
            condition = condition.add(comics::Column::Id.ne(exclude.value()));
        }

        if comics::Entity::find().filter(condition).one(conn).await?.is_some() {
            return Err(match number {
                Some(number) => ComicError::NumberAlreadyExists(number),
                None => ComicError::ExtraTitleAlreadyExists {
                    title: title.to_string(),
                    slug: slug.to_string(),
                },
            });
        }
        Ok(())
    }

    /// Makes `names` the exact tag set of the comic.
    ///
    /// Tags are inserted with `ON CONFLICT DO NOTHING` and read back, so two
    /// requests introducing the same tag never fail on the unique name.
    async fn replace_tags<C: ConnectionTrait>(
        conn: &C,
        comic_id: ComicId,
        names: &[TagName],
    ) -> ComicResult<()> {
        comic_tags::Entity::delete_many()
            .filter(comic_tags::Column::ComicId.eq(comic_id.value()))
            .exec(conn)
            .await?;
        if names.is_empty() {
            return Ok(());
        }

        let new_tags = names.iter().map(|name| tags::ActiveModel {
            name: Set(name.as_str().to_string()),
            ..Default::default()
        });
        tags::Entity::insert_many(new_tags)
            .on_conflict(OnConflict::column(tags::Column::Name).do_nothing().to_owned())
            .exec_without_returning(conn)
            .await?;

        let tag_ids: Vec<i32> = tags::Entity::find()
            .select_only()
            .column(tags::Column::Id)
            .filter(tags::Column::Name.is_in(names.iter().map(|name| name.as_str().to_string())))
            .into_tuple()
            .all(conn)
            .await?;

        let links = tag_ids.into_iter().map(|tag_id| comic_tags::ActiveModel {
            comic_id: Set(comic_id.value()),
            tag_id: Set(tag_id),
        });
        comic_tags::Entity::insert_many(links)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }
}

/// Validates and de-duplicates tag names, keeping first-seen order.
fn validate_tags(raw: &[String]) -> ComicResult<Vec<TagName>> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(raw.len());
    for name in raw {
        let name = TagName::new(name)?;
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    Ok(names)
}

/// LIKE pattern matching `needle` anywhere, with `\` escaping its wildcards.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn assemble(
    model: comics::Model,
    tags: Vec<String>,
    all: Vec<Translation>,
) -> ComicResult<ComicWithTranslations> {
    let comic_id = ComicId::from_db(model.id);
    let mut original = None;
    let mut published = Vec::new();
    let mut drafts = Vec::new();
    for translation in all {
        if translation.is_draft {
            drafts.push(translation);
        } else if translation.language.is_original() && original.is_none() {
            original = Some(translation);
        } else {
            published.push(translation);
        }
    }

    let original = original.ok_or(TranslationError::LanguageNotFound {
        comic_id,
        language: Language::original(),
    })?;

    Ok(ComicWithTranslations {
        comic: Comic {
            id: comic_id,
            number: model.number.map(IssueNumber::from_db),
            slug: model.slug,
            publication_date: model.publication_date,
            explain_url: model.explain_url,
            click_url: model.click_url,
            is_interactive: model.is_interactive,
            tags,
        },
        original,
        translations: published,
        drafts,
    })
}

fn conflict_on_unique(err: DbErr, number: Option<IssueNumber>, title: &str, slug: &str) -> ComicError {
    if !is_unique_violation(&err) {
        return ComicError::Database(err);
    }
    match number {
        Some(number) => ComicError::NumberAlreadyExists(number),
        None => ComicError::ExtraTitleAlreadyExists {
            title: title.to_string(),
            slug: slug.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tags_dedupes_in_order() {
        let tags = validate_tags(&["Physics".into(), "math".into(), "Physics".into()]).unwrap();
        let names: Vec<&str> = tags.iter().map(TagName::as_str).collect();
        assert_eq!(names, vec!["Physics", "math"]);
    }

    #[test]
    fn test_validate_tags_rejects_short_names() {
        assert!(matches!(
            validate_tags(&["x".into()]),
            Err(ComicError::Value(_))
        ));
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern(r"100%_a\b"), r"%100\%\_a\\b%");
        assert_eq!(contains_pattern("moon"), "%moon%");
    }

    #[test]
    fn test_filter_defaults() {
        let filter: ComicFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter.tag_combination, TagCombination::Or);
        assert_eq!(filter.order_by, ComicOrderBy::Number);
        assert_eq!(Pagination::default().limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn test_original_request_is_published_original_language() {
        let original = OriginalTranslationRequest {
            title: "Barrel".to_string(),
            tooltip: String::new(),
            raw_transcript: String::new(),
            translator_comment: String::new(),
            source_url: None,
            image_ids: Vec::new(),
        };
        let request = original.to_translation_request();
        assert!(request.language.is_original());
        assert!(!request.is_draft);
    }
}
