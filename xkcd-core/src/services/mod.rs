pub mod comic_service;
pub mod image_intake_service;
pub mod processed_image_consumer;
pub mod translation_image_service;
pub mod translation_service;

pub use comic_service::{
    Comic, ComicFilter, ComicOrderBy, ComicRequest, ComicService, ComicWithTranslations,
    OriginalTranslationRequest, Pagination, SortOrder, TagCombination,
};
pub use image_intake_service::{ImageHandle, ImageIntakeService, Upload};
pub use processed_image_consumer::ProcessedImageConsumer;
pub use translation_image_service::{TranslationImage, TranslationImageService};
pub use translation_service::{Translation, TranslationRequest, TranslationService};
