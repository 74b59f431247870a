//! The operations offered to callers, in one place.
//!
//! Every operation returns a value or a well-defined rejection; background
//! failures are only visible through status snapshots and catalog records.

use crate::catalog_store::{AssetId, AssetRecord, CatalogStore};
use crate::config::{DownloadSettings, SettingsStore, SettingsUpdate, SettingsUpdateError};
use crate::download_manager::{AssetFetcher, DownloadKind, DownloadManager, DownloadRequestOutcome};
use crate::gallery::GallerySource;
use crate::scrape::{ScrapeController, ScrapeJobState, StartOutcome};
use crate::status::{StatusPublisher, StatusSnapshot};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Asset {0} not found")]
    NotFound(AssetId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<SettingsUpdateError> for ServiceError {
    fn from(err: SettingsUpdateError) -> Self {
        match err {
            SettingsUpdateError::Invalid(msg) => ServiceError::InvalidArgument(msg),
            SettingsUpdateError::Storage(e) => ServiceError::Internal(e),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogListing {
    pub records: Vec<AssetRecord>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadRequestStatus {
    AlreadyDownloaded,
    Queued,
    AlreadyQueued,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadAccepted {
    pub accepted: bool,
    pub status: DownloadRequestStatus,
    /// Local path when the file is already on disk.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchAccepted {
    pub accepted_count: usize,
    pub requested_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThumbnailsAccepted {
    pub accepted: bool,
    pub queued_count: usize,
}

pub struct KnobGalleryService {
    catalog: Arc<dyn CatalogStore>,
    scrape: ScrapeController,
    downloads: Arc<DownloadManager>,
    settings: Arc<SettingsStore>,
    status: StatusPublisher,
}

impl KnobGalleryService {
    /// Wire the components together and start the download workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        catalog: Arc<dyn CatalogStore>,
        source: Arc<dyn GallerySource>,
        fetcher: Arc<dyn AssetFetcher>,
        settings: Arc<SettingsStore>,
    ) -> anyhow::Result<Self> {
        let scrape = ScrapeController::new(source, catalog.clone());
        let downloads = DownloadManager::start(catalog.clone(), fetcher, settings.clone())?;
        let status = StatusPublisher::new(scrape.clone(), downloads.clone());
        Ok(Self {
            catalog,
            scrape,
            downloads,
            settings,
            status,
        })
    }

    // =========================================================================
    // Crawl
    // =========================================================================

    pub fn start_scrape(&self) -> StartOutcome {
        self.scrape.start()
    }

    pub fn scrape_status(&self) -> ScrapeJobState {
        self.scrape.snapshot()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// List a page of the catalog. `page` is 1-based.
    pub fn list_catalog(&self, page: usize, page_size: usize) -> Result<CatalogListing, ServiceError> {
        if page == 0 {
            return Err(ServiceError::InvalidArgument(
                "page must be at least 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ServiceError::InvalidArgument(format!(
                "page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let result = self.catalog.list_page(page, page_size)?;
        let total_pages = result.total_count.div_ceil(page_size).max(1);
        Ok(CatalogListing {
            records: result.records,
            page,
            page_size,
            total_pages,
            total_count: result.total_count,
        })
    }

    pub fn get_asset(&self, id: AssetId) -> Result<AssetRecord, ServiceError> {
        self.catalog.get(id)?.ok_or(ServiceError::NotFound(id))
    }

    // =========================================================================
    // Downloads
    // =========================================================================

    /// Request the knob file of an asset, and its thumbnail when it has none.
    pub fn request_download(&self, id: AssetId) -> Result<DownloadAccepted, ServiceError> {
        let outcome = self.downloads.request_download(id, DownloadKind::File)?;
        let accepted = match outcome {
            DownloadRequestOutcome::UnknownAsset => return Err(ServiceError::NotFound(id)),
            DownloadRequestOutcome::AlreadyDownloaded(path) => DownloadAccepted {
                accepted: true,
                status: DownloadRequestStatus::AlreadyDownloaded,
                path: Some(path),
            },
            DownloadRequestOutcome::Enqueued(_) => DownloadAccepted {
                accepted: true,
                status: DownloadRequestStatus::Queued,
                path: None,
            },
            DownloadRequestOutcome::Joined(_) => DownloadAccepted {
                accepted: true,
                status: DownloadRequestStatus::AlreadyQueued,
                path: None,
            },
        };

        if let Err(e) = self.downloads.request_download(id, DownloadKind::Thumbnail) {
            warn!("Failed to queue thumbnail of asset {}: {:#}", id, e);
        }
        Ok(accepted)
    }

    pub fn request_batch_download(&self, ids: &[AssetId]) -> Result<BatchAccepted, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "No knob IDs provided".to_string(),
            ));
        }
        let accepted_count = self.downloads.request_batch(ids, DownloadKind::File)?;
        Ok(BatchAccepted {
            accepted_count,
            requested_count: ids.len(),
        })
    }

    pub fn request_all_thumbnails(&self) -> Result<ThumbnailsAccepted, ServiceError> {
        let queued_count = self.downloads.request_all_thumbnails()?;
        Ok(ThumbnailsAccepted {
            accepted: true,
            queued_count,
        })
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub fn settings(&self) -> DownloadSettings {
        self.settings.get()
    }

    pub fn default_settings(&self) -> DownloadSettings {
        self.settings.defaults()
    }

    /// Apply a settings change. Tasks already queued keep the settings they
    /// were scheduled with.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<DownloadSettings, ServiceError> {
        let updated = self.settings.update(update)?;
        self.downloads.on_settings_changed();
        Ok(updated)
    }

    pub fn shutdown(&self) {
        self.downloads.shutdown();
    }
}
