pub mod broker_messages;
pub mod comic_tags;
pub mod comics;
pub mod tags;
pub mod translation_images;
pub mod translations;
