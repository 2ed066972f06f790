//! Runtime settings
//!
//! Loaded once by each binary and handed to constructors. Every field has a
//! default so an empty (or absent) settings file is valid.
//!
//! ```toml
//! [database]
//! url = "sqlite://data/xkcd.db?mode=rwc"
//!
//! [storage]
//! root = "data/images"
//! upload_max_size = 10485760
//!
//! [download]
//! attempts = 3
//! timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub broker: BrokerSettings,
    pub storage: StorageSettings,
    pub download: DownloadSettings,
    pub server: ServerSettings,
    pub worker: WorkerSettings,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://xkcd.db?mode=rwc".to_string(),
            max_connections: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// The broker lives in a SQLite database that the API and the worker share.
/// When `url` is unset the main database is used.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub url: Option<String>,
    /// Deliveries before a failing message is dead-lettered.
    pub max_deliveries: i32,
    pub lease_secs: u64,
    pub poll_interval_ms: u64,
    pub retention_hours: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_deliveries: 3,
            lease_secs: 60,
            poll_interval_ms: 500,
            retention_hours: 72,
        }
    }
}

impl BrokerSettings {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub tmp_dir: PathBuf,
    /// Upper bound for a single upload or download, in bytes.
    pub upload_max_size: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/images"),
            tmp_dir: PathBuf::from("data/tmp"),
            upload_max_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub attempts: u32,
    pub backoff_ms: u64,
    /// Wall-clock bound around the whole retry loop.
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl DownloadSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub cors_origin: Option<String>,
    /// Messages pulled per poll by the processed-image consumer.
    pub consumer_batch: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_origin: None,
            consumer_batch: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub name: String,
    pub thumbnail_size: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: "image-worker".to_string(),
            thumbnail_size: 400,
        }
    }
}

impl Settings {
    /// Reads `path` if given, then applies `XKCD_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("XKCD_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = lookup("XKCD_BROKER_URL") {
            self.broker.url = Some(url);
        }
        if let Some(root) = lookup("XKCD_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("XKCD_TMP_DIR") {
            self.storage.tmp_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("XKCD_UPLOAD_MAX_SIZE") {
            self.storage.upload_max_size =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "XKCD_UPLOAD_MAX_SIZE".to_string(),
                        value: raw.clone(),
                    })?;
        }
        Ok(())
    }

    pub fn broker_url(&self) -> &str {
        self.broker.url.as_deref().unwrap_or(&self.database.url)
    }
}
