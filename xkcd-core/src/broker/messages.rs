//! Typed payloads exchanged over the broker.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::value_objects::{ComicId, ImageId, IssueNumber};

/// API → worker: convert an original and derive its thumbnail.
pub const IMAGES_CONVERT_IN: &str = "images.convert.in";
/// Worker → API: derived artifacts are ready.
pub const IMAGES_CONVERT_OUT: &str = "images.convert.out";
/// A comic was created; consumed by notification front-ends.
pub const COMICS_NEW: &str = "comics.new";

pub trait BrokerMessage: Serialize + DeserializeOwned + Send + Sync {
    const SUBJECT: &'static str;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvertImage {
    pub image_id: ImageId,
    pub original_abs_path: PathBuf,
}

impl BrokerMessage for ConvertImage {
    const SUBJECT: &'static str = IMAGES_CONVERT_IN;
}

/// Either path may be absent: animations are never converted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageProcessed {
    pub image_id: ImageId,
    pub converted_abs_path: Option<PathBuf>,
    pub thumbnail_abs_path: Option<PathBuf>,
}

impl BrokerMessage for ImageProcessed {
    const SUBJECT: &'static str = IMAGES_CONVERT_OUT;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComicCreated {
    pub comic_id: ComicId,
    pub number: Option<IssueNumber>,
}

impl BrokerMessage for ComicCreated {
    const SUBJECT: &'static str = COMICS_NEW;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_processed_wire_format() {
        let msg = ImageProcessed {
            image_id: ImageId::new(5).unwrap(),
            converted_abs_path: None,
            thumbnail_abs_path: Some(PathBuf::from("/srv/thumbnails/a.webp")),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "image_id": 5,
                "converted_abs_path": null,
                "thumbnail_abs_path": "/srv/thumbnails/a.webp",
            })
        );
    }

    #[test]
    fn test_invalid_image_id_is_rejected() {
        let raw = r#"{"image_id": 0, "original_abs_path": "/a.png"}"#;
        assert!(serde_json::from_str::<ConvertImage>(raw).is_err());
    }
}
