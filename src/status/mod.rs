//! Read-only view of crawl and download progress.

use crate::download_manager::{DownloadCounters, DownloadManager};
use crate::scrape::{ScrapeController, ScrapeJobState};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub scrape: ScrapeJobState,
    pub downloads: DownloadCounters,
}

/// Mirrors state owned by the scrape controller and the download manager.
/// Holds no state of its own and can be shared across any number of readers.
#[derive(Clone)]
pub struct StatusPublisher {
    scrape: ScrapeController,
    downloads: Arc<DownloadManager>,
}

impl StatusPublisher {
    pub fn new(scrape: ScrapeController, downloads: Arc<DownloadManager>) -> Self {
        Self { scrape, downloads }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            scrape: self.scrape.snapshot(),
            downloads: self.downloads.counters(),
        }
    }
}
