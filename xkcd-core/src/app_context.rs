use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::broker::{MessageBroker, Publisher, SqlBroker};
use crate::config::Settings;
use crate::services::{
    ComicService, ImageIntakeService, ProcessedImageConsumer, TranslationImageService,
    TranslationService,
};
use crate::storage::ImageFileStorage;

/// Composition root: built once at startup and handed to the presentation layer.
#[derive(Clone)]
pub struct AppContext {
    settings: Arc<Settings>,
    broker: Arc<SqlBroker>,
    intake: Arc<ImageIntakeService>,
    image_service: Arc<TranslationImageService>,
    translation_service: Arc<TranslationService>,
    comic_service: Arc<ComicService>,
}

impl AppContext {
    /// `broker_db` may be the same connection as `db`.
    pub fn new(
        db: DatabaseConnection,
        broker_db: DatabaseConnection,
        settings: Settings,
        http_client: reqwest::Client,
    ) -> Self {
        let broker = Arc::new(SqlBroker::new(broker_db, settings.broker.max_deliveries));
        let publisher = Publisher::new(broker.clone() as Arc<dyn MessageBroker>);
        let storage = ImageFileStorage::new(settings.storage.root.clone());

        let intake = Arc::new(ImageIntakeService::new(
            &settings.storage,
            settings.download.clone(),
            http_client,
        ));
        let image_service = Arc::new(TranslationImageService::new(
            db.clone(),
            storage,
            publisher.clone(),
        ));
        let translation_service = Arc::new(TranslationService::new(db.clone()));
        let comic_service = Arc::new(ComicService::new(db, publisher));

        Self {
            settings: Arc::new(settings),
            broker,
            intake,
            image_service,
            translation_service,
            comic_service,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn broker(&self) -> Arc<SqlBroker> {
        self.broker.clone()
    }

    pub fn intake(&self) -> Arc<ImageIntakeService> {
        self.intake.clone()
    }

    pub fn image_service(&self) -> Arc<TranslationImageService> {
        self.image_service.clone()
    }

    pub fn translation_service(&self) -> Arc<TranslationService> {
        self.translation_service.clone()
    }

    pub fn comic_service(&self) -> Arc<ComicService> {
        self.comic_service.clone()
    }

    pub fn processed_image_consumer(&self) -> ProcessedImageConsumer {
        ProcessedImageConsumer::new(
            self.broker.clone(),
            self.image_service.clone(),
            "api",
            self.settings.server.consumer_batch,
            self.settings.broker.lease(),
            self.settings.broker.poll_interval(),
        )
    }
}
