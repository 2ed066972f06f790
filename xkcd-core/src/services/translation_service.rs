use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::db_errors::is_unique_violation;
use crate::database::entities::{comics, translations};
use crate::errors::{TranslationError, TranslationResult};
use crate::services::translation_image_service::{TranslationImage, TranslationImageService};
use crate::value_objects::{ComicId, ImageId, Language, TranslationId};

/// Create/update payload for a translation.
#[derive(Clone, Debug, Deserialize)]
pub struct TranslationRequest {
    pub language: Language,
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
    #[serde(default)]
    pub is_draft: bool,
}

impl TranslationRequest {
    /// Concatenation of the non-empty textual fields.
    pub fn searchable_text(&self) -> String {
        [
            self.title.as_str(),
            self.tooltip.as_str(),
            self.raw_transcript.as_str(),
            self.translator_comment.as_str(),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Translation {
    pub id: TranslationId,
    pub comic_id: ComicId,
    pub language: Language,
    pub title: String,
    pub tooltip: String,
    pub raw_transcript: String,
    pub translator_comment: String,
    pub source_url: Option<String>,
    pub is_draft: bool,
    pub images: Vec<TranslationImage>,
}

impl Translation {
    pub(crate) fn from_model(
        model: translations::Model,
        images: Vec<TranslationImage>,
    ) -> TranslationResult<Self> {
        Ok(Self {
            id: TranslationId::from_db(model.id),
            comic_id: ComicId::from_db(model.comic_id),
            language: Language::new(&model.language)?,
            title: model.title,
            tooltip: model.tooltip,
            raw_transcript: model.raw_transcript,
            translator_comment: model.translator_comment,
            source_url: model.source_url,
            is_draft: model.is_draft,
            images,
        })
    }
}

/// Translation lifecycle: drafts, publishing and exclusive image attachment.
///
/// A comic has at most one published translation per language. Application
/// checks run first; the partial unique index catches whatever races past them.
#[derive(Clone)]
pub struct TranslationService {
    db: DatabaseConnection,
}

impl TranslationService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        comic_id: ComicId,
        request: &TranslationRequest,
    ) -> TranslationResult<TranslationId> {
        let txn = self.db.begin().await?;

        comics::Entity::find_by_id(comic_id.value())
            .one(&txn)
            .await?
            .ok_or(TranslationError::ComicNotFound(comic_id))?;

        if request.language.is_original() {
            // a second published original is reported as the conflict it is
            if !request.is_draft {
                Self::ensure_no_published(&txn, comic_id, &request.language, None).await?;
            }
            return Err(TranslationError::OriginalOperationForbidden);
        }

        let id = Self::insert(&txn, comic_id, request).await?;
        txn.commit().await?;

        info!(
            translation_id = %id,
            comic_id = %comic_id,
            language = %request.language,
            is_draft = request.is_draft,
            "translation created"
        );
        Ok(id)
    }

    /// Inserts a translation and attaches its images on `conn`.
    ///
    /// Used for the original translation during comic creation as well, so it
    /// performs no original-language check of its own.
    pub(crate) async fn insert<C: ConnectionTrait>(
        conn: &C,
        comic_id: ComicId,
        request: &TranslationRequest,
    ) -> TranslationResult<TranslationId> {
        if !request.is_draft {
            Self::ensure_no_published(conn, comic_id, &request.language, None).await?;
        }

        TranslationImageService::get_many_by_ids(conn, &request.image_ids, None).await?;

        let mut translation = translations::ActiveModel::new();
        translation.comic_id = Set(comic_id.value());
        translation.language = Set(request.language.to_string());
        translation.title = Set(request.title.clone());
        translation.tooltip = Set(request.tooltip.clone());
        translation.raw_transcript = Set(request.raw_transcript.clone());
        translation.translator_comment = Set(request.translator_comment.clone());
        translation.source_url = Set(request.source_url.clone());
        translation.is_draft = Set(request.is_draft);
        translation.searchable_text = Set(request.searchable_text());

        let model = translation
            .insert(conn)
            .await
            .map_err(|err| already_exists_on_conflict(err, comic_id, &request.language))?;
        let id = TranslationId::from_db(model.id);

        TranslationImageService::attach_to_translation(conn, &request.image_ids, id).await?;
        Ok(id)
    }

    /// Replaces the textual fields and the image set.
    ///
    /// Draft status is not changed here; publishing goes through [`Self::publish`].
    pub async fn update(&self, id: TranslationId, request: &TranslationRequest) -> TranslationResult<()> {
        let txn = self.db.begin().await?;
        Self::update_in(&txn, id, request).await?;
        txn.commit().await?;

        info!(translation_id = %id, "translation updated");
        Ok(())
    }

    pub(crate) async fn update_in<C: ConnectionTrait>(
        conn: &C,
        id: TranslationId,
        request: &TranslationRequest,
    ) -> TranslationResult<()> {
        let model = Self::find_model(conn, id).await?;
        let comic_id = ComicId::from_db(model.comic_id);
        let current_language = Language::new(&model.language)?;

        if current_language.is_original() != request.language.is_original() {
            return Err(TranslationError::OriginalOperationForbidden);
        }
        if request.is_draft != model.is_draft {
            return Err(TranslationError::DraftStatusChangeForbidden(id));
        }
        if !model.is_draft && request.language != current_language {
            Self::ensure_no_published(conn, comic_id, &request.language, Some(id)).await?;
        }

        TranslationImageService::get_many_by_ids(conn, &request.image_ids, Some(id)).await?;
        let detached = TranslationImageService::detach(conn, id, &request.image_ids).await?;
        TranslationImageService::attach_to_translation(conn, &request.image_ids, id).await?;
        if detached > 0 {
            debug!(translation_id = %id, detached, "images dropped from translation");
        }

        let mut translation = model.into_active_model().set_updated_at();
        translation.language = Set(request.language.to_string());
        translation.title = Set(request.title.clone());
        translation.tooltip = Set(request.tooltip.clone());
        translation.raw_transcript = Set(request.raw_transcript.clone());
        translation.translator_comment = Set(request.translator_comment.clone());
        translation.source_url = Set(request.source_url.clone());
        translation.searchable_text = Set(request.searchable_text());

        translation
            .update(conn)
            .await
            .map_err(|err| already_exists_on_conflict(err, comic_id, &request.language))?;
        Ok(())
    }

    /// Turns a draft into the published translation for its language.
    pub async fn publish(&self, id: TranslationId) -> TranslationResult<()> {
        let txn = self.db.begin().await?;

        let model = Self::find_model(&txn, id).await?;
        if !model.is_draft {
            return Err(TranslationError::AlreadyPublished(id));
        }
        let comic_id = ComicId::from_db(model.comic_id);
        let language = Language::new(&model.language)?;

        // a sibling may have been published since this draft was created
        Self::ensure_no_published(&txn, comic_id, &language, Some(id)).await?;

        let mut translation = model.into_active_model().set_updated_at();
        translation.is_draft = Set(false);
        translation
            .update(&txn)
            .await
            .map_err(|err| already_exists_on_conflict(err, comic_id, &language))?;

        txn.commit().await?;
        info!(translation_id = %id, comic_id = %comic_id, language = %language, "translation published");
        Ok(())
    }

    /// Deletes a translation, detaching (not deleting) its images.
    pub async fn delete(&self, id: TranslationId) -> TranslationResult<()> {
        let txn = self.db.begin().await?;

        let model = Self::find_model(&txn, id).await?;
        if Language::new(&model.language)?.is_original() {
            return Err(TranslationError::OriginalOperationForbidden);
        }

        let detached = TranslationImageService::detach(&txn, id, &[]).await?;
        model.delete(&txn).await?;
        txn.commit().await?;

        info!(translation_id = %id, detached, "translation deleted");
        Ok(())
    }

    pub async fn get_by_id(&self, id: TranslationId) -> TranslationResult<Translation> {
        let model = Self::find_model(&self.db, id).await?;
        Self::with_images(&self.db, vec![model])
            .await?
            .pop()
            .ok_or(TranslationError::NotFound(id))
    }

    /// The published translation of `comic_id` in `language`.
    pub async fn get_by_language(
        &self,
        comic_id: ComicId,
        language: &Language,
    ) -> TranslationResult<Translation> {
        let model = translations::Entity::find()
            .filter(translations::Column::ComicId.eq(comic_id.value()))
            .filter(translations::Column::Language.eq(language.as_str()))
            .filter(translations::Column::IsDraft.eq(false))
            .one(&self.db)
            .await?
            .ok_or_else(|| TranslationError::LanguageNotFound {
                comic_id,
                language: language.clone(),
            })?;

        Self::with_images(&self.db, vec![model])
            .await?
            .pop()
            .ok_or_else(|| TranslationError::LanguageNotFound {
                comic_id,
                language: language.clone(),
            })
    }

    pub async fn get_raw_transcript(&self, id: TranslationId) -> TranslationResult<String> {
        Ok(Self::find_model(&self.db, id).await?.raw_transcript)
    }

    pub async fn list_for_comic(
        &self,
        comic_id: ComicId,
        language: Option<&Language>,
        include_drafts: bool,
    ) -> TranslationResult<Vec<Translation>> {
        comics::Entity::find_by_id(comic_id.value())
            .one(&self.db)
            .await?
            .ok_or(TranslationError::ComicNotFound(comic_id))?;

        let mut query = translations::Entity::find()
            .filter(translations::Column::ComicId.eq(comic_id.value()));
        if let Some(language) = language {
            query = query.filter(translations::Column::Language.eq(language.as_str()));
        }
        if !include_drafts {
            query = query.filter(translations::Column::IsDraft.eq(false));
        }

        let models = query
            .order_by_asc(translations::Column::Id)
            .all(&self.db)
            .await?;
        Self::with_images(&self.db, models).await
    }

    /// Attaches image lists to translation rows, keeping their order.
    pub(crate) async fn with_images<C: ConnectionTrait>(
        conn: &C,
        models: Vec<translations::Model>,
    ) -> TranslationResult<Vec<Translation>> {
        let ids: Vec<i32> = models.iter().map(|model| model.id).collect();
        let mut images: HashMap<i32, Vec<TranslationImage>> =
            TranslationImageService::for_translations(conn, &ids).await?;

        models
            .into_iter()
            .map(|model| {
                let own = images.remove(&model.id).unwrap_or_default();
                Translation::from_model(model, own)
            })
            .collect()
    }

    async fn find_model<C: ConnectionTrait>(
        conn: &C,
        id: TranslationId,
    ) -> TranslationResult<translations::Model> {
        translations::Entity::find_by_id(id.value())
            .one(conn)
            .await?
            .ok_or(TranslationError::NotFound(id))
    }

    async fn ensure_no_published<C: ConnectionTrait>(
        conn: &C,
        comic_id: ComicId,
        language: &Language,
        exclude: Option<TranslationId>,
    ) -> TranslationResult<()> {
        let mut query = translations::Entity::find()
            .filter(translations::Column::ComicId.eq(comic_id.value()))
            .filter(translations::Column::Language.eq(language.as_str()))
            .filter(translations::Column::IsDraft.eq(false));
        if let Some(exclude) = exclude {
            query = query.filter(translations::Column::Id.ne(exclude.value()));
        }

        if query.one(conn).await?.is_some() {
            return Err(TranslationError::AlreadyExists {
                comic_id,
                language: language.clone(),
            });
        }
        Ok(())
    }
}

fn already_exists_on_conflict(err: DbErr, comic_id: ComicId, language: &Language) -> TranslationError {
    if is_unique_violation(&err) {
        TranslationError::AlreadyExists {
            comic_id,
            language: language.clone(),
        }
    } else {
        TranslationError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, tooltip: &str) -> TranslationRequest {
        TranslationRequest {
            language: Language::new("ru").unwrap(),
            title: title.to_string(),
            tooltip: tooltip.to_string(),
            raw_transcript: String::new(),
            translator_comment: "  ".to_string(),
            source_url: None,
            image_ids: Vec::new(),
            is_draft: true,
        }
    }

    #[test]
    fn test_searchable_text_skips_empty_fields() {
        assert_eq!(request("Title", "Tip").searchable_text(), "Title Tip");
        assert_eq!(request("Title", "").searchable_text(), "Title");
    }

    #[test]
    fn test_request_defaults() {
        let request: TranslationRequest =
            serde_json::from_str(r#"{"language": "de", "title": "Titel"}"#).unwrap();
        assert_eq!(request.language.as_str(), "DE");
        assert!(!request.is_draft);
        assert!(request.image_ids.is_empty());
    }
}
