//! File storage for image artifacts.
//!
//! Layout under the root:
//!
//! ```text
//! originals/<sha256>.<ext>
//! converted/<sha256>.webp
//! thumbnails/<sha256>.webp
//! ```
//!
//! The database keeps paths relative to the root; broker messages carry
//! absolute paths so the worker needs no knowledge of the layout.

use std::io;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::value_objects::ImageFormat;

const ORIGINALS_DIR: &str = "originals";
const CONVERTED_DIR: &str = "converted";
const THUMBNAILS_DIR: &str = "thumbnails";

#[derive(Clone, Debug)]
pub struct ImageFileStorage {
    root: PathBuf,
}

impl ImageFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Moves a validated temp file into `originals/` and returns its relative path.
    ///
    /// Identical bytes land on the same file, so the second copy is discarded.
    pub async fn persist_original(&self, temp_path: &Path, format: ImageFormat) -> io::Result<String> {
        let digest = sha256_file(temp_path).await?;
        let rel = format!("{}/{}.{}", ORIGINALS_DIR, digest, format.extension());
        let target = self.root.join(&rel);

        if tokio::fs::try_exists(&target).await? {
            debug!(path = %target.display(), "original already stored, discarding duplicate");
            tokio::fs::remove_file(temp_path).await?;
            return Ok(rel);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // rename fails across devices; fall back to copy + remove
        if tokio::fs::rename(temp_path, &target).await.is_err() {
            tokio::fs::copy(temp_path, &target).await?;
            tokio::fs::remove_file(temp_path).await?;
        }

        debug!(path = %target.display(), "stored original image");
        Ok(rel)
    }

    pub fn converted_path_for(&self, original_abs: &Path) -> PathBuf {
        self.derived_path(CONVERTED_DIR, original_abs)
    }

    pub fn thumbnail_path_for(&self, original_abs: &Path) -> PathBuf {
        self.derived_path(THUMBNAILS_DIR, original_abs)
    }

    pub fn rel_to_abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Relative, `/`-separated form of a path under the root.
    ///
    /// Paths outside the root are kept as given.
    pub fn abs_to_rel(&self, abs: &Path) -> String {
        match abs.strip_prefix(&self.root) {
            Ok(rel) => rel
                .components()
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => abs.to_string_lossy().into_owned(),
        }
    }

    fn derived_path(&self, dir: &str, original_abs: &Path) -> PathBuf {
        let stem = original_abs
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.root.join(dir).join(format!("{}.webp", stem))
    }
}

async fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
