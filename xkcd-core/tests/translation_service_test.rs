use std::sync::Arc;

use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use sea_orm_migration::MigratorTrait;

use xkcd::broker::{MessageBroker, Publisher, SqlBroker};
use xkcd::database::entities::{translation_images, translations};
use xkcd::database::migrations::Migrator;
use xkcd::errors::{DomainError, ErrorKind, ImageError, TranslationError};
use xkcd::services::{
    ComicRequest, ComicService, OriginalTranslationRequest, TranslationImageService,
    TranslationRequest, TranslationService,
};
use xkcd::value_objects::{ComicId, ImageId, IssueNumber, Language, TranslationId};
use xkcd_test_utils::TestDb;

async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = TestDb::new_in_memory().connect().await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

fn services(db: &DatabaseConnection) -> (ComicService, TranslationService) {
    let broker: Arc<dyn MessageBroker> = Arc::new(SqlBroker::new(db.clone(), 3));
    let publisher = Publisher::new(broker);
    (
        ComicService::new(db.clone(), publisher),
        TranslationService::new(db.clone()),
    )
}

async fn new_image(db: &DatabaseConnection, name: &str) -> ImageId {
    TranslationImageService::create(db, &format!("originals/{}.png", name))
        .await
        .unwrap()
        .id
}

async fn owner_of(db: &DatabaseConnection, id: ImageId) -> Option<i32> {
    translation_images::Entity::find_by_id(id.value())
        .one(db)
        .await
        .unwrap()
        .expect("image row should exist")
        .translation_id
}

async fn create_comic(
    comics: &ComicService,
    number: i32,
    image_ids: Vec<ImageId>,
) -> (ComicId, TranslationId) {
    comics
        .create(
            &ComicRequest {
                number: Some(IssueNumber::new(number).unwrap()),
                publication_date: NaiveDate::from_ymd_opt(2009, 3, 4).unwrap(),
                explain_url: None,
                click_url: None,
                is_interactive: false,
                tags: vec![],
            },
            &OriginalTranslationRequest {
                title: format!("Comic {}", number),
                tooltip: "tooltip".to_string(),
                raw_transcript: "transcript".to_string(),
                translator_comment: String::new(),
                source_url: None,
                image_ids,
            },
        )
        .await
        .unwrap()
}

fn ru(title: &str, image_ids: Vec<ImageId>, is_draft: bool) -> TranslationRequest {
    TranslationRequest {
        language: Language::new("ru").unwrap(),
        title: title.to_string(),
        tooltip: String::new(),
        raw_transcript: "Текст".to_string(),
        translator_comment: String::new(),
        source_url: None,
        image_ids,
        is_draft,
    }
}

#[tokio::test]
async fn test_original_translation_owns_its_images() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);

    let image = new_image(&db, "a").await;
    let (comic_id, original_id) = create_comic(&comics, 42, vec![image]).await;

    assert_eq!(owner_of(&db, image).await, Some(original_id.value()));

    // a second published original is a conflict
    let mut duplicate = ru("Another", vec![], false);
    duplicate.language = Language::original();
    let err = translations.create(comic_id, &duplicate).await.unwrap_err();
    assert!(matches!(err, TranslationError::AlreadyExists { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_original_language_drafts_are_forbidden() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, _) = create_comic(&comics, 1, vec![]).await;

    let mut draft = ru("Draft", vec![], true);
    draft.language = Language::original();
    let err = translations.create(comic_id, &draft).await.unwrap_err();
    assert!(matches!(err, TranslationError::OriginalOperationForbidden));
}

#[tokio::test]
async fn test_one_published_translation_per_language() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, _) = create_comic(&comics, 2, vec![]).await;

    translations
        .create(comic_id, &ru("Первый", vec![], false))
        .await
        .unwrap();

    let err = translations
        .create(comic_id, &ru("Второй", vec![], false))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::AlreadyExists { .. }));

    // drafts may coexist with the published one
    translations
        .create(comic_id, &ru("Черновик", vec![], true))
        .await
        .unwrap();
    translations
        .create(comic_id, &ru("Черновик 2", vec![], true))
        .await
        .unwrap();

    let published = translations
        .list_for_comic(comic_id, Some(&Language::new("ru").unwrap()), false)
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].title, "Первый");

    let all = translations
        .list_for_comic(comic_id, Some(&Language::new("ru").unwrap()), true)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_create_for_missing_comic() {
    let db = setup_test_db().await.unwrap();
    let (_, translations) = services(&db);

    let err = translations
        .create(ComicId::new(999).unwrap(), &ru("x", vec![], false))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::ComicNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_attaching_owned_image_conflicts() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);

    let image = new_image(&db, "owned").await;
    let (comic_id, original_id) = create_comic(&comics, 3, vec![image]).await;

    let err = translations
        .create(comic_id, &ru("Перевод", vec![image], false))
        .await
        .unwrap_err();

    match &err {
        TranslationError::Image(ImageError::AlreadyAttached { conflicts }) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].image_id, image);
            assert_eq!(conflicts[0].translation_id, original_id);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // nothing was written
    let rows = translations::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_missing_image_rolls_back_everything() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, _) = create_comic(&comics, 4, vec![]).await;

    let existing = new_image(&db, "seven").await;
    let missing = ImageId::new(existing.value() + 100).unwrap();

    let err = translations
        .create(comic_id, &ru("Перевод", vec![existing, missing], false))
        .await
        .unwrap_err();

    match &err {
        TranslationError::Image(ImageError::ManyNotFound { image_ids }) => {
            assert_eq!(image_ids, &vec![missing]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.details()["image_ids"], serde_json::json!([missing.value()]));

    assert_eq!(owner_of(&db, existing).await, None);
    let rows = translations::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1, "only the original translation remains");
}

#[tokio::test]
async fn test_publish_rechecks_uniqueness() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, _) = create_comic(&comics, 5, vec![]).await;

    let draft = translations
        .create(comic_id, &ru("Черновик", vec![], true))
        .await
        .unwrap();
    translations
        .create(comic_id, &ru("Опубликован", vec![], false))
        .await
        .unwrap();

    let err = translations.publish(draft).await.unwrap_err();
    assert!(matches!(err, TranslationError::AlreadyExists { .. }));

    let still_draft = translations.get_by_id(draft).await.unwrap();
    assert!(still_draft.is_draft);
}

#[tokio::test]
async fn test_publish_draft() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, _) = create_comic(&comics, 6, vec![]).await;

    let draft = translations
        .create(comic_id, &ru("Черновик", vec![], true))
        .await
        .unwrap();
    translations.publish(draft).await.unwrap();

    let published = translations
        .get_by_language(comic_id, &Language::new("RU").unwrap())
        .await
        .unwrap();
    assert_eq!(published.id, draft);

    let err = translations.publish(draft).await.unwrap_err();
    assert!(matches!(err, TranslationError::AlreadyPublished(_)));
}

#[tokio::test]
async fn test_update_cannot_toggle_draft_or_language_class() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, original_id) = create_comic(&comics, 7, vec![]).await;

    let draft = translations
        .create(comic_id, &ru("Черновик", vec![], true))
        .await
        .unwrap();

    let err = translations
        .update(draft, &ru("Черновик", vec![], false))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::DraftStatusChangeForbidden(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let mut to_original = ru("Черновик", vec![], true);
    to_original.language = Language::original();
    let err = translations.update(draft, &to_original).await.unwrap_err();
    assert!(matches!(err, TranslationError::OriginalOperationForbidden));

    let err = translations
        .update(original_id, &ru("Original", vec![], false))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::OriginalOperationForbidden));
}

#[tokio::test]
async fn test_update_replaces_image_set() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, _) = create_comic(&comics, 8, vec![]).await;

    let first = new_image(&db, "first").await;
    let second = new_image(&db, "second").await;
    let id = translations
        .create(comic_id, &ru("Перевод", vec![first], false))
        .await
        .unwrap();

    let mut request = ru("Перевод (исправлен)", vec![second], false);
    request.translator_comment = "fixed typo".to_string();
    translations.update(id, &request).await.unwrap();

    assert_eq!(owner_of(&db, first).await, None);
    assert_eq!(owner_of(&db, second).await, Some(id.value()));

    let updated = translations.get_by_id(id).await.unwrap();
    assert_eq!(updated.title, "Перевод (исправлен)");
    assert_eq!(updated.images.len(), 1);
    assert_eq!(updated.images[0].id, second);

    let row = translations::Entity::find_by_id(id.value())
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert!(row.searchable_text.contains("fixed typo"));
}

#[tokio::test]
async fn test_delete_detaches_images() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (comic_id, original_id) = create_comic(&comics, 9, vec![]).await;

    let image = new_image(&db, "kept").await;
    let id = translations
        .create(comic_id, &ru("Перевод", vec![image], false))
        .await
        .unwrap();
    assert_eq!(owner_of(&db, image).await, Some(id.value()));

    translations.delete(id).await.unwrap();

    assert_eq!(owner_of(&db, image).await, None);
    let err = translations.get_by_id(id).await.unwrap_err();
    assert!(matches!(err, TranslationError::NotFound(_)));

    let err = translations.delete(original_id).await.unwrap_err();
    assert!(matches!(err, TranslationError::OriginalOperationForbidden));

    let err = translations.delete(id).await.unwrap_err();
    assert!(matches!(err, TranslationError::NotFound(_)));
}

#[tokio::test]
async fn test_raw_transcript() {
    let db = setup_test_db().await.unwrap();
    let (comics, translations) = services(&db);
    let (_, original_id) = create_comic(&comics, 10, vec![]).await;

    let transcript = translations.get_raw_transcript(original_id).await.unwrap();
    assert_eq!(transcript, "transcript");

    let err = translations
        .get_raw_transcript(TranslationId::new(404).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "TRANSLATION_NOT_FOUND");
}
