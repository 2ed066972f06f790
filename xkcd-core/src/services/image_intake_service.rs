use std::io;
use std::path::{Path, PathBuf};

use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{DownloadSettings, StorageSettings};
use crate::errors::{ImageError, ImageResult};
use crate::value_objects::{Dimensions, ImageFormat};

/// Bytes are written to disk in pieces no larger than this.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// An uploaded file as handed over by the transport layer.
pub struct Upload<S> {
    pub filename: String,
    pub body: S,
}

/// A validated image sitting in the temp directory.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageHandle {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub dimensions: Dimensions,
    pub size: u64,
}

/// Validates incoming images and stages them as temp files.
///
/// Every failure after the temp file is created removes it before returning.
#[derive(Clone)]
pub struct ImageIntakeService {
    tmp_dir: PathBuf,
    max_size: u64,
    download: DownloadSettings,
    client: reqwest::Client,
}

impl ImageIntakeService {
    pub fn new(storage: &StorageSettings, download: DownloadSettings, client: reqwest::Client) -> Self {
        Self {
            tmp_dir: storage.tmp_dir.clone(),
            max_size: storage.upload_max_size,
            download,
            client,
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub async fn read<S, B, E>(&self, upload: Option<Upload<S>>) -> ImageResult<ImageHandle>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let upload = match upload {
            Some(upload) if !upload.filename.trim().is_empty() => upload,
            _ => return Err(ImageError::EmptyFile),
        };

        let path = self.temp_path().await?;
        let result = match self.write_stream(&path, upload.body).await {
            Ok(written) => inspect(&path, written).await,
            Err(err) => Err(err),
        };
        self.keep_or_discard(path, result).await
    }

    pub async fn download(&self, url: &str) -> ImageResult<ImageHandle> {
        let parsed = Url::parse(url).map_err(|_| ImageError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ImageError::InvalidUrl(url.to_string()));
        }

        let path = self.temp_path().await?;

        let fetched = tokio::time::timeout(self.download.timeout(), self.fetch_into(url, &path)).await;
        let result = match fetched {
            Ok(Ok(written)) => inspect(&path, written).await,
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(url, timeout_secs = self.download.timeout_secs, "image download timed out");
                Err(ImageError::DownloadFailed {
                    url: url.to_string(),
                })
            }
        };
        self.keep_or_discard(path, result).await
    }

    async fn fetch_into(&self, url: &str, path: &Path) -> ImageResult<u64> {
        for attempt in 1..=self.download.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.download.backoff()).await;
            }

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(url, attempt, error = %err, "image download request failed");
                    continue;
                }
            };

            if response.status() != reqwest::StatusCode::OK {
                warn!(url, attempt, status = %response.status(), "unexpected status downloading image");
                continue;
            }

            match self.write_stream(path, Box::pin(response.bytes_stream())).await {
                Ok(written) => {
                    info!(url, bytes = written, "downloaded image");
                    return Ok(written);
                }
                Err(err @ ImageError::SizeLimitExceeded { .. }) => return Err(err),
                Err(err) => {
                    warn!(url, attempt, error = %err, "image download interrupted");
                }
            }
        }

        Err(ImageError::DownloadFailed {
            url: url.to_string(),
        })
    }

    /// Truncates `path` and streams `body` into it, enforcing the size limit.
    async fn write_stream<S, B, E>(&self, path: &Path, mut body: S) -> ImageResult<u64>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(io::Error::other)?;
            for piece in chunk.as_ref().chunks(CHUNK_SIZE) {
                written += piece.len() as u64;
                if written > self.max_size {
                    return Err(ImageError::SizeLimitExceeded {
                        limit: self.max_size,
                    });
                }
                file.write_all(piece).await?;
            }
        }

        file.flush().await?;
        Ok(written)
    }

    async fn temp_path(&self) -> ImageResult<PathBuf> {
        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        Ok(self.tmp_dir.join(format!("{}.tmp", Uuid::new_v4())))
    }

    async fn keep_or_discard(
        &self,
        path: PathBuf,
        result: ImageResult<ImageHandle>,
    ) -> ImageResult<ImageHandle> {
        if result.is_err() {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "failed to remove temp file");
                }
            }
        }
        result
    }
}

/// Sniffs the real format from the file contents and reads the pixel dimensions.
async fn inspect(path: &Path, written: u64) -> ImageResult<ImageHandle> {
    if written == 0 {
        return Err(ImageError::EmptyFile);
    }

    let owned = path.to_path_buf();
    let (format, dimensions) = tokio::task::spawn_blocking(move || -> ImageResult<_> {
        let kind = infer::get_from_path(&owned)?;
        let extension = kind.map(|kind| kind.extension().to_string());
        let format = extension
            .as_deref()
            .and_then(ImageFormat::from_extension)
            .ok_or_else(|| ImageError::UnsupportedFormat {
                format: extension.clone(),
                supported: ImageFormat::ALL.to_vec(),
            })?;

        // temp files carry no meaningful extension, the decoder has to sniff too
        let (width, height) = image::ImageReader::open(&owned)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|err| ImageError::UnreadableImage(err.to_string()))?;
        Ok((format, Dimensions { width, height }))
    })
    .await
    .map_err(io::Error::other)??;

    debug!(path = %path.display(), %format, width = dimensions.width, height = dimensions.height, "image accepted");
    Ok(ImageHandle {
        path: path.to_path_buf(),
        format,
        dimensions,
        size: written,
    })
}
