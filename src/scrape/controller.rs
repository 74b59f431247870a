use super::state::{ScrapeJobState, ScrapePhase};
use crate::catalog_store::{AssetRecord, CatalogStore};
use crate::gallery::GallerySource;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Result of a start request.
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    /// False when a crawl was already running; nothing was started.
    pub accepted: bool,
    pub state: ScrapeJobState,
}

/// Drives gallery crawls into the catalog.
///
/// The job state lives behind a single mutex: the running check and the
/// transition to `Running` happen under the same lock, so at most one crawl
/// runs per controller.
#[derive(Clone)]
pub struct ScrapeController {
    source: Arc<dyn GallerySource>,
    catalog: Arc<dyn CatalogStore>,
    state: Arc<Mutex<ScrapeJobState>>,
}

impl ScrapeController {
    pub fn new(source: Arc<dyn GallerySource>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            source,
            catalog,
            state: Arc::new(Mutex::new(ScrapeJobState::default())),
        }
    }

    pub fn snapshot(&self) -> ScrapeJobState {
        self.state.lock().unwrap().clone()
    }

    /// Start a crawl in the background unless one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> StartOutcome {
        let started = {
            let mut state = self.state.lock().unwrap();
            if state.is_running() {
                return StartOutcome {
                    accepted: false,
                    state: state.clone(),
                };
            }
            *state = ScrapeJobState {
                phase: ScrapePhase::Running,
                total_items_known: 0,
                completed_items: 0,
                started_at: Some(chrono::Utc::now().timestamp()),
                finished_at: None,
            };
            state.clone()
        };

        info!("Gallery crawl started");
        let this = self.clone();
        tokio::spawn(async move {
            this.run().await;
        });

        StartOutcome {
            accepted: true,
            state: started,
        }
    }

    async fn run(&self) {
        let outcome = self.crawl().await;

        let mut state = self.state.lock().unwrap();
        state.finished_at = Some(chrono::Utc::now().timestamp());
        match outcome {
            Ok(()) => {
                info!(
                    "Gallery crawl finished: {} entries upserted",
                    state.completed_items
                );
                state.phase = ScrapePhase::Succeeded;
            }
            Err(reason) => {
                error!(
                    "Gallery crawl failed after {} entries: {}",
                    state.completed_items, reason
                );
                state.phase = ScrapePhase::Failed { reason };
            }
        }
    }

    /// Fetch pages in order until the source reports no further cursor.
    async fn crawl(&self) -> Result<(), String> {
        let mut cursor: Option<String> = None;
        let mut page_index = 0usize;

        loop {
            let page = self
                .source
                .fetch_page(cursor.take())
                .await
                .map_err(|e| e.to_string())?;
            page_index += 1;

            let records: Vec<AssetRecord> =
                page.entries.into_iter().map(|e| e.into_record()).collect();
            let written = self
                .catalog
                .upsert_many(&records)
                .map_err(|e| format!("Catalog write failed: {:#}", e))?;

            {
                let mut state = self.state.lock().unwrap();
                state.completed_items += written;
                state.total_items_known = state
                    .total_items_known
                    .max(state.completed_items)
                    .max(page.total_hint.unwrap_or(0));
                info!(
                    "Crawl page {}: {} entries ({}/{} so far)",
                    page_index, written, state.completed_items, state.total_items_known
                );
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }
}
