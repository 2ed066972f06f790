use std::collections::{BTreeSet, HashMap};

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::broker::{ConvertImage, ImageProcessed, Publisher};
use crate::database::entities::translation_images;
use crate::errors::{AttachmentConflict, ImageError, ImageResult};
use crate::services::image_intake_service::ImageHandle;
use crate::storage::ImageFileStorage;
use crate::value_objects::{ImageId, TranslationId};

/// Image record as exposed to clients. Paths are relative to the storage root.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranslationImage {
    pub id: ImageId,
    pub translation_id: Option<TranslationId>,
    pub original: String,
    pub converted: Option<String>,
    pub thumbnail: Option<String>,
}

impl From<translation_images::Model> for TranslationImage {
    fn from(model: translation_images::Model) -> Self {
        Self {
            id: ImageId::from_db(model.id),
            translation_id: model.translation_id.map(TranslationId::from_db),
            original: model.original,
            converted: model.converted,
            thumbnail: model.thumbnail,
        }
    }
}

/// Persistent image records and their exclusive attachment to translations.
///
/// The ownership operations are associated functions over any connection so the
/// translation and comic services can run them inside their own transactions.
#[derive(Clone)]
pub struct TranslationImageService {
    db: DatabaseConnection,
    storage: ImageFileStorage,
    publisher: Publisher,
}

impl TranslationImageService {
    pub fn new(db: DatabaseConnection, storage: ImageFileStorage, publisher: Publisher) -> Self {
        Self {
            db,
            storage,
            publisher,
        }
    }

    /// Stores a validated upload, records it unattached and queues its conversion.
    pub async fn create_from_upload(&self, handle: ImageHandle) -> ImageResult<TranslationImage> {
        let original_rel = match self.storage.persist_original(&handle.path, handle.format).await {
            Ok(rel) => rel,
            Err(err) => {
                let _ = tokio::fs::remove_file(&handle.path).await;
                return Err(err.into());
            }
        };

        let image = Self::create(&self.db, &original_rel).await?;

        let message = ConvertImage {
            image_id: image.id,
            original_abs_path: self.storage.rel_to_abs(&original_rel),
        };
        if let Err(err) = self.publisher.publish(&message).await {
            // the unattached record is harmless, the client may retry the upload
            warn!(image_id = %image.id, error = %err, "failed to queue image conversion");
            return Err(err.into());
        }

        info!(image_id = %image.id, original = %original_rel, "image created");
        Ok(image)
    }

    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        original_rel: &str,
    ) -> ImageResult<TranslationImage> {
        let mut image = translation_images::ActiveModel::new();
        image.original = Set(original_rel.to_string());
        let model = image.insert(conn).await?;
        Ok(model.into())
    }

    pub async fn get_by_id(&self, id: ImageId) -> ImageResult<TranslationImage> {
        translation_images::Entity::find_by_id(id.value())
            .one(&self.db)
            .await?
            .map(TranslationImage::from)
            .ok_or(ImageError::NotFound(id))
    }

    /// Loads the requested images, checking existence and ownership.
    ///
    /// Every requested id must exist, and every image must be unattached or owned
    /// by `expected_owner`. Both failures report the full offending set.
    pub async fn get_many_by_ids<C: ConnectionTrait>(
        conn: &C,
        ids: &[ImageId],
        expected_owner: Option<TranslationId>,
    ) -> ImageResult<Vec<TranslationImage>> {
        let requested: BTreeSet<ImageId> = ids.iter().copied().collect();
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let found: Vec<TranslationImage> = translation_images::Entity::find()
            .filter(translation_images::Column::Id.is_in(requested.iter().map(|id| id.value())))
            .order_by_asc(translation_images::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(TranslationImage::from)
            .collect();

        let found_ids: BTreeSet<ImageId> = found.iter().map(|image| image.id).collect();
        let missing: Vec<ImageId> = requested.difference(&found_ids).copied().collect();
        if !missing.is_empty() {
            return Err(ImageError::ManyNotFound { image_ids: missing });
        }

        let mut conflicts: Vec<AttachmentConflict> = found
            .iter()
            .filter_map(|image| match image.translation_id {
                Some(owner) if Some(owner) != expected_owner => Some(AttachmentConflict {
                    translation_id: owner,
                    image_id: image.id,
                }),
                _ => None,
            })
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort();
            return Err(ImageError::AlreadyAttached { conflicts });
        }

        Ok(found)
    }

    /// Sets the owner of `ids`. Callers must have passed [`Self::get_many_by_ids`]
    /// on the same connection first.
    pub async fn attach_to_translation<C: ConnectionTrait>(
        conn: &C,
        ids: &[ImageId],
        translation_id: TranslationId,
    ) -> ImageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        translation_images::Entity::update_many()
            .col_expr(
                translation_images::Column::TranslationId,
                Expr::value(translation_id.value()),
            )
            .col_expr(
                translation_images::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(translation_images::Column::Id.is_in(ids.iter().map(|id| id.value())))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Clears the owner of every image of `translation_id` except `keep`.
    ///
    /// Image rows and files are never deleted here.
    pub async fn detach<C: ConnectionTrait>(
        conn: &C,
        translation_id: TranslationId,
        keep: &[ImageId],
    ) -> ImageResult<u64> {
        let mut update = translation_images::Entity::update_many()
            .col_expr(
                translation_images::Column::TranslationId,
                Expr::value(Option::<i32>::None),
            )
            .col_expr(
                translation_images::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(translation_images::Column::TranslationId.eq(translation_id.value()));
        if !keep.is_empty() {
            update = update
                .filter(translation_images::Column::Id.is_not_in(keep.iter().map(|id| id.value())));
        }
        let result = update.exec(conn).await?;
        Ok(result.rows_affected)
    }

    /// Detaches every image owned by any of `translation_ids`.
    pub async fn detach_all<C: ConnectionTrait>(conn: &C, translation_ids: &[i32]) -> ImageResult<u64> {
        if translation_ids.is_empty() {
            return Ok(0);
        }
        let result = translation_images::Entity::update_many()
            .col_expr(
                translation_images::Column::TranslationId,
                Expr::value(Option::<i32>::None),
            )
            .col_expr(
                translation_images::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(translation_images::Column::TranslationId.is_in(translation_ids.iter().copied()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Sets the converted artifact path. Writing the stored value again is a no-op.
    pub async fn update_converted(&self, id: ImageId, converted_rel: &str) -> ImageResult<()> {
        self.update_path(id, translation_images::Column::Converted, converted_rel)
            .await
    }

    /// Sets the thumbnail path. Writing the stored value again is a no-op.
    pub async fn update_thumbnail(&self, id: ImageId, thumbnail_rel: &str) -> ImageResult<()> {
        self.update_path(id, translation_images::Column::Thumbnail, thumbnail_rel)
            .await
    }

    /// Applies a worker result. Returns `false` when the image no longer exists.
    ///
    /// Absent paths leave their column untouched, so applying the same message
    /// twice leaves the record (including `updated_at`) exactly as applying it once.
    pub async fn apply_processed(&self, message: &ImageProcessed) -> ImageResult<bool> {
        match self.apply_paths(message).await {
            Ok(()) => {
                info!(image_id = %message.image_id, "image artifacts applied");
                Ok(true)
            }
            Err(ImageError::NotFound(id)) => {
                info!(image_id = %id, "processed image no longer exists, ignoring");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn list_for_translation(
        &self,
        translation_id: TranslationId,
    ) -> ImageResult<Vec<TranslationImage>> {
        let images = translation_images::Entity::find()
            .filter(translation_images::Column::TranslationId.eq(translation_id.value()))
            .order_by_asc(translation_images::Column::Id)
            .all(&self.db)
            .await?;
        Ok(images.into_iter().map(TranslationImage::from).collect())
    }

    /// Images of several translations at once, keyed by raw translation id.
    pub async fn for_translations<C: ConnectionTrait>(
        conn: &C,
        translation_ids: &[i32],
    ) -> ImageResult<HashMap<i32, Vec<TranslationImage>>> {
        let mut grouped: HashMap<i32, Vec<TranslationImage>> = HashMap::new();
        if translation_ids.is_empty() {
            return Ok(grouped);
        }

        let images = translation_images::Entity::find()
            .filter(translation_images::Column::TranslationId.is_in(translation_ids.iter().copied()))
            .order_by_asc(translation_images::Column::Id)
            .all(conn)
            .await?;
        for image in images {
            if let Some(owner) = image.translation_id {
                grouped.entry(owner).or_default().push(image.into());
            }
        }
        Ok(grouped)
    }

    async fn apply_paths(&self, message: &ImageProcessed) -> ImageResult<()> {
        let id = message.image_id;
        if let Some(path) = message.converted_abs_path.as_deref() {
            self.update_converted(id, &self.storage.abs_to_rel(path)).await?;
        }
        if let Some(path) = message.thumbnail_abs_path.as_deref() {
            self.update_thumbnail(id, &self.storage.abs_to_rel(path)).await?;
        }
        if message.converted_abs_path.is_none() && message.thumbnail_abs_path.is_none() {
            self.get_by_id(id).await?;
        }
        Ok(())
    }

    async fn update_path(
        &self,
        id: ImageId,
        column: translation_images::Column,
        rel_path: &str,
    ) -> ImageResult<()> {
        let result = translation_images::Entity::update_many()
            .col_expr(column, Expr::value(rel_path.to_string()))
            .col_expr(
                translation_images::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(translation_images::Column::Id.eq(id.value()))
            .filter(
                Condition::any()
                    .add(column.is_null())
                    .add(column.ne(rel_path)),
            )
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            return Ok(());
        }

        // nothing written: either already up to date or gone
        let exists = translation_images::Entity::find_by_id(id.value())
            .one(&self.db)
            .await?
            .is_some();
        if exists {
            debug!(image_id = %id, column = ?column, "image path already up to date");
            Ok(())
        } else {
            Err(ImageError::NotFound(id))
        }
    }
}
