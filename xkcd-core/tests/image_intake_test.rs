use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use xkcd::config::{DownloadSettings, StorageSettings};
use xkcd::errors::{DomainError, ErrorKind, ImageError};
use xkcd::services::{ImageIntakeService, Upload};
use xkcd::value_objects::{Dimensions, ImageFormat};
use xkcd_test_utils::{fixtures, TempDir};

fn intake(dir: &TempDir, max_size: u64) -> ImageIntakeService {
    let download = DownloadSettings {
        attempts: 2,
        backoff_ms: 10,
        timeout_secs: 1,
    };
    intake_with(dir, max_size, download)
}

fn intake_with(dir: &TempDir, max_size: u64, download: DownloadSettings) -> ImageIntakeService {
    let storage = StorageSettings {
        root: dir.path().join("images"),
        tmp_dir: dir.path().join("tmp"),
        upload_max_size: max_size,
    };
    ImageIntakeService::new(&storage, download, reqwest::Client::new())
}

fn upload(
    filename: &str,
    chunks: Vec<Vec<u8>>,
) -> Option<Upload<impl futures_util::Stream<Item = Result<Vec<u8>, io::Error>> + Unpin>> {
    Some(Upload {
        filename: filename.to_string(),
        body: stream::iter(chunks.into_iter().map(Ok)),
    })
}

fn temp_files(dir: &TempDir) -> Vec<String> {
    TempDir::files_in(&dir.path().join("tmp"))
}

/// Answers every connection with the same canned response.
async fn serve(status: &'static str, body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = vec![0u8; 4096];
                let _ = socket.read(&mut request).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/comic.png", addr), hits)
}

#[tokio::test]
async fn test_read_accepts_png_in_several_chunks() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024 * 1024);
    let bytes = fixtures::png_bytes(30, 20).unwrap();
    let (head, tail) = bytes.split_at(bytes.len() / 2);

    let handle = service
        .read(upload("comic.png", vec![head.to_vec(), tail.to_vec()]))
        .await
        .unwrap();

    assert_eq!(handle.format, ImageFormat::Png);
    assert_eq!(
        handle.dimensions,
        Dimensions {
            width: 30,
            height: 20
        }
    );
    assert_eq!(handle.size, bytes.len() as u64);
    assert_eq!(std::fs::read(&handle.path).unwrap(), bytes);
}

#[tokio::test]
async fn test_read_sniffs_format_regardless_of_filename() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024 * 1024);

    let handle = service
        .read(upload("actually-a.png", vec![fixtures::jpeg_bytes(8, 8).unwrap()]))
        .await
        .unwrap();
    assert_eq!(handle.format, ImageFormat::Jpeg);

    let handle = service
        .read(upload("anim", vec![fixtures::gif_bytes(4, 4, 3).unwrap()]))
        .await
        .unwrap();
    assert_eq!(handle.format, ImageFormat::Gif);
}

#[tokio::test]
async fn test_read_rejects_missing_or_empty_upload() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024);

    let none: Option<Upload<stream::Iter<std::vec::IntoIter<Result<Vec<u8>, io::Error>>>>> = None;
    assert!(matches!(
        service.read(none).await.unwrap_err(),
        ImageError::EmptyFile
    ));
    assert!(matches!(
        service.read(upload("", vec![b"abc".to_vec()])).await.unwrap_err(),
        ImageError::EmptyFile
    ));

    let err = service.read(upload("empty.png", vec![])).await.unwrap_err();
    assert!(matches!(err, ImageError::EmptyFile));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(temp_files(&dir).is_empty());
}

#[tokio::test]
async fn test_read_rejects_unsupported_format() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024);

    let err = service
        .read(upload("doc.png", vec![fixtures::PDF_BYTES.to_vec()]))
        .await
        .unwrap_err();
    match &err {
        ImageError::UnsupportedFormat { format, supported } => {
            assert_eq!(format.as_deref(), Some("pdf"));
            assert_eq!(supported.len(), 4);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    assert!(temp_files(&dir).is_empty());
}

#[tokio::test]
async fn test_read_enforces_size_limit() {
    let dir = TempDir::new().unwrap();
    let bytes = fixtures::png_bytes(64, 64).unwrap();
    let service = intake(&dir, bytes.len() as u64 - 1);

    let err = service.read(upload("big.png", vec![bytes])).await.unwrap_err();
    assert!(matches!(err, ImageError::SizeLimitExceeded { .. }));
    assert!(temp_files(&dir).is_empty());

    let exact = fixtures::png_bytes(64, 64).unwrap();
    let service = intake(&dir, exact.len() as u64);
    service.read(upload("fits.png", vec![exact])).await.unwrap();
}

#[tokio::test]
async fn test_read_rejects_undecodable_image() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024);

    let err = service
        .read(upload("broken.png", vec![fixtures::truncated_png_bytes()]))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::UnreadableImage(_)));
    assert!(temp_files(&dir).is_empty());
}

#[tokio::test]
async fn test_download_success() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024 * 1024);
    let bytes = fixtures::png_bytes(16, 9).unwrap();
    let (url, hits) = serve("200 OK", bytes.clone()).await;

    let handle = service.download(&url).await.unwrap();

    assert_eq!(handle.format, ImageFormat::Png);
    assert_eq!(handle.dimensions.width, 16);
    assert_eq!(std::fs::read(&handle.path).unwrap(), bytes);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_download_gives_up_after_attempts() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024);
    let (url, hits) = serve("404 Not Found", b"missing".to_vec()).await;

    let err = service.download(&url).await.unwrap_err();

    assert!(matches!(err, ImageError::DownloadFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(temp_files(&dir).is_empty());
}

#[tokio::test]
async fn test_download_backs_off_between_attempts_only() {
    let dir = TempDir::new().unwrap();
    let service = intake_with(
        &dir,
        1024,
        DownloadSettings {
            attempts: 2,
            backoff_ms: 400,
            timeout_secs: 30,
        },
    );
    let (url, hits) = serve("503 Service Unavailable", Vec::new()).await;

    let started = Instant::now();
    let err = service.download(&url).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ImageError::DownloadFailed { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    // one pause before the retry, none after the final attempt
    assert!(elapsed >= Duration::from_millis(400), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(800), "{:?}", elapsed);
}

#[tokio::test]
async fn test_download_single_attempt_fails_without_waiting() {
    let dir = TempDir::new().unwrap();
    let service = intake_with(
        &dir,
        1024,
        DownloadSettings {
            attempts: 1,
            backoff_ms: 10_000,
            timeout_secs: 30,
        },
    );

    // nothing listens on a port whose listener was dropped
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let started = Instant::now();
    let err = service
        .download(&format!("http://{}/gone.png", addr))
        .await
        .unwrap_err();

    assert!(matches!(err, ImageError::DownloadFailed { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(temp_files(&dir).is_empty());
}

#[tokio::test]
async fn test_download_oversize_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 16);
    let (url, hits) = serve("200 OK", fixtures::png_bytes(32, 32).unwrap()).await;

    let err = service.download(&url).await.unwrap_err();

    assert!(matches!(err, ImageError::SizeLimitExceeded { limit: 16 }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(temp_files(&dir).is_empty());
}

#[tokio::test]
async fn test_download_times_out() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024);

    // accepts connections but never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });

    let err = service
        .download(&format!("http://{}/slow.png", addr))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::DownloadFailed { .. }));
    assert!(temp_files(&dir).is_empty());
}

#[tokio::test]
async fn test_download_rejects_non_http_urls() {
    let dir = TempDir::new().unwrap();
    let service = intake(&dir, 1024);

    for url in ["not a url", "file:///etc/passwd"] {
        let err = service.download(url).await.unwrap_err();
        assert!(matches!(err, ImageError::InvalidUrl(_)), "{}", url);
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
