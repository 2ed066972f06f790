//! Conversion of stored originals into WebP artifacts.
//!
//! Still images get a lossless WebP copy under `converted/` and a thumbnail
//! derived from that copy. Animations (multi-frame GIF, animated WebP, APNG)
//! are never converted; their thumbnail comes from the first frame of the
//! original.

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ImageReader};
use thiserror::Error;
use tracing::debug;

use xkcd::storage::ImageFileStorage;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Image file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Image processing failed for {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Processing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ProcessError {
    /// A vanished source file will not come back on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProcessError::FileNotFound(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedPaths {
    /// `None` for animations.
    pub converted: Option<PathBuf>,
    pub thumbnail: PathBuf,
}

#[derive(Clone)]
pub struct ImageProcessor {
    storage: ImageFileStorage,
    thumbnail_size: u32,
}

impl ImageProcessor {
    pub fn new(storage: ImageFileStorage, thumbnail_size: u32) -> Self {
        Self {
            storage,
            thumbnail_size: thumbnail_size.max(1),
        }
    }

    /// Runs the CPU-bound work on the blocking pool. Re-processing the same
    /// original overwrites the same output paths.
    pub async fn process(&self, original: &Path) -> Result<ProcessedPaths, ProcessError> {
        let processor = self.clone();
        let original = original.to_path_buf();
        tokio::task::spawn_blocking(move || processor.process_blocking(&original)).await?
    }

    fn process_blocking(&self, original: &Path) -> Result<ProcessedPaths, ProcessError> {
        let bytes = match std::fs::read(original) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ProcessError::FileNotFound(original.to_path_buf()))
            }
            Err(err) => return Err(err.into()),
        };

        let decoded = decode(original, &bytes)?;

        let (converted, thumbnail_source) = if is_animation(&bytes) {
            debug!(path = %original.display(), "animation detected, skipping conversion");
            (None, decoded)
        } else {
            let target = self.storage.converted_path_for(original);
            write_webp(&decoded, &target)?;
            let converted_bytes = std::fs::read(&target)?;
            let reread = decode(&target, &converted_bytes)?;
            (Some(target), reread)
        };

        let thumbnail = self.storage.thumbnail_path_for(original);
        write_webp(&fit_within(thumbnail_source, self.thumbnail_size), &thumbnail)?;

        Ok(ProcessedPaths {
            converted,
            thumbnail,
        })
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<DynamicImage, ProcessError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()
        .map_err(|source| ProcessError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Scales down to fit a `size`×`size` box. Smaller images are kept as they are.
fn fit_within(image: DynamicImage, size: u32) -> DynamicImage {
    if image.width() <= size && image.height() <= size {
        return image;
    }
    image.resize(size, size, FilterType::Triangle)
}

/// Encodes lossless WebP next to `target` and renames it into place.
fn write_webp(image: &DynamicImage, target: &Path) -> Result<(), ProcessError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let partial = target.with_extension("webp.part");
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    {
        let mut writer = BufWriter::new(File::create(&partial)?);
        rgba.write_with_encoder(WebPEncoder::new_lossless(&mut writer))
            .map_err(|source| ProcessError::Image {
                path: target.to_path_buf(),
                source,
            })?;
        writer.flush()?;
    }
    std::fs::rename(&partial, target)?;
    Ok(())
}

/// True for multi-frame GIFs, animated WebP and APNG.
pub fn is_animation(bytes: &[u8]) -> bool {
    match infer::get(bytes).map(|kind| kind.extension()) {
        Some("gif") => GifDecoder::new(Cursor::new(bytes))
            .map(|decoder| decoder.into_frames().take(2).count() > 1)
            .unwrap_or(false),
        Some("webp") => webp_is_animated(bytes),
        Some("png") => png_has_animation_control(bytes),
        _ => false,
    }
}

/// Extended WebP (`VP8X`) carries an animation flag in its first flags byte.
fn webp_is_animated(bytes: &[u8]) -> bool {
    const ANIMATION_FLAG: u8 = 0x02;
    bytes.len() > 20 && &bytes[12..16] == b"VP8X" && bytes[20] & ANIMATION_FLAG != 0
}

/// APNG announces itself with an `acTL` chunk before the first `IDAT`.
fn png_has_animation_control(bytes: &[u8]) -> bool {
    let mut offset = 8;
    while offset + 8 <= bytes.len() {
        let length = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        match &bytes[offset + 4..offset + 8] {
            b"acTL" => return true,
            b"IDAT" | b"IEND" => return false,
            _ => {}
        }
        // length, type and crc around the data
        offset = match offset.checked_add(length + 12) {
            Some(next) => next,
            None => return false,
        };
    }
    false
}
