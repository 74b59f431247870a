mod file_config;
mod settings_store;

pub use file_config::{DownloadConfig, FileConfig, GalleryConfig};
pub use settings_store::{SettingsStore, SettingsUpdate, SettingsUpdateError};

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_GALLERY_URL: &str = "https://www.g200kg.com/en/webknobman/gallery.php";
pub const DEFAULT_THUMBNAIL_BASE_URL: &str = "https://www.g200kg.com/en/webknobman/data/gal";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub download_dir: Option<PathBuf>,
    pub gallery_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,

    pub gallery: GallerySettings,
    pub download: DownloadSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let gallery_file = file.gallery.unwrap_or_default();
        let gallery_defaults = GallerySettings::default();
        let gallery = GallerySettings {
            gallery_url: gallery_file
                .gallery_url
                .or_else(|| cli.gallery_url.clone())
                .unwrap_or(gallery_defaults.gallery_url),
            thumbnail_base_url: gallery_file
                .thumbnail_base_url
                .unwrap_or(gallery_defaults.thumbnail_base_url),
            request_timeout_secs: gallery_file
                .request_timeout_secs
                .unwrap_or(gallery_defaults.request_timeout_secs),
        };

        // Download settings - merge file config with defaults
        let dl_file = file.download.unwrap_or_default();
        let dl_defaults = DownloadSettings::default();
        let download = DownloadSettings {
            download_dir: dl_file
                .download_dir
                .map(PathBuf::from)
                .or_else(|| cli.download_dir.clone())
                .unwrap_or(dl_defaults.download_dir),
            max_download_workers: dl_file
                .max_download_workers
                .unwrap_or(dl_defaults.max_download_workers),
            max_concurrent_downloads: dl_file
                .max_concurrent_downloads
                .unwrap_or(dl_defaults.max_concurrent_downloads),
            download_batch_size: dl_file
                .download_batch_size
                .unwrap_or(dl_defaults.download_batch_size),
            download_retry_attempts: dl_file
                .download_retry_attempts
                .unwrap_or(dl_defaults.download_retry_attempts),
            initial_backoff_ms: dl_file
                .initial_backoff_ms
                .unwrap_or(dl_defaults.initial_backoff_ms),
            max_backoff_ms: dl_file.max_backoff_ms.unwrap_or(dl_defaults.max_backoff_ms),
            backoff_multiplier: dl_file
                .backoff_multiplier
                .unwrap_or(dl_defaults.backoff_multiplier),
            request_timeout_secs: dl_file
                .request_timeout_secs
                .unwrap_or(dl_defaults.request_timeout_secs),
        };

        if download.max_download_workers == 0
            || download.max_concurrent_downloads == 0
            || download.download_batch_size == 0
            || download.download_retry_attempts == 0
        {
            bail!("Download worker, concurrency, batch and retry settings must be at least 1");
        }

        Ok(Self {
            db_dir,
            port,
            gallery,
            download,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    /// Where runtime settings changes are persisted.
    pub fn settings_path(&self) -> PathBuf {
        self.db_dir.join("settings.toml")
    }
}

#[derive(Debug, Clone)]
pub struct GallerySettings {
    pub gallery_url: String,
    pub thumbnail_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            gallery_url: DEFAULT_GALLERY_URL.to_string(),
            thumbnail_base_url: DEFAULT_THUMBNAIL_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Settings consumed by the download manager each time it schedules a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadSettings {
    pub download_dir: PathBuf,
    pub max_download_workers: usize,
    pub max_concurrent_downloads: usize,
    pub download_batch_size: usize,
    pub download_retry_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub request_timeout_secs: u64,
}

impl DownloadSettings {
    pub fn knobs_dir(&self) -> PathBuf {
        self.download_dir.join("knobs")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.download_dir.join("thumbnails")
    }

    /// Create the download root and its `knobs/` and `thumbnails/` subdirectories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.knobs_dir())?;
        std::fs::create_dir_all(self.thumbnails_dir())
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_download_workers: default_worker_count(),
            max_concurrent_downloads: 10,
            download_batch_size: 20,
            download_retry_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            request_timeout_secs: 30,
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("KnobGallery")
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        * 4
}
