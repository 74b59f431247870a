//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own catalog database, download
//! directory and fake gallery.

#![allow(dead_code)]

use super::constants::*;
use super::fake_gallery::spawn_fake_gallery;
use knob_gallery_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use knob_gallery_server::config::{DownloadSettings, GallerySettings, SettingsStore};
use knob_gallery_server::download_manager::HttpAssetFetcher;
use knob_gallery_server::gallery::WebKnobManSource;
use knob_gallery_server::{make_app, KnobGalleryService, ServerState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated storage.
///
/// When dropped, the server shuts down and temp directories are removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Catalog store shared with the server, for direct inspection in tests
    pub catalog: Arc<dyn CatalogStore>,

    /// Download directory the server starts with
    pub download_dir: PathBuf,

    service: Arc<KnobGalleryService>,
    _temp_db_dir: TempDir,
    _temp_download_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port, pointed at a fresh fake
    /// gallery. The catalog starts empty.
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp db dir");
        let temp_download_dir = TempDir::new().expect("Failed to create temp download dir");
        let download_dir = temp_download_dir.path().to_path_buf();

        let (gallery_url, thumbnail_base_url) = spawn_fake_gallery().await;
        let gallery_settings = GallerySettings {
            gallery_url,
            thumbnail_base_url,
            request_timeout_secs: 5,
        };
        let download_settings = DownloadSettings {
            download_dir: download_dir.clone(),
            max_download_workers: 2,
            max_concurrent_downloads: 2,
            download_batch_size: 2,
            download_retry_attempts: 2,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            backoff_multiplier: 2.0,
            request_timeout_secs: 5,
        };

        let catalog: Arc<dyn CatalogStore> = Arc::new(
            SqliteCatalogStore::new(temp_db_dir.path().join("catalog.db"))
                .expect("Failed to open catalog store"),
        );
        let settings = Arc::new(
            SettingsStore::new(
                download_settings,
                Some(temp_db_dir.path().join("settings.toml")),
            )
            .expect("Failed to create settings store"),
        );
        let source = Arc::new(
            WebKnobManSource::new(&gallery_settings).expect("Failed to create gallery source"),
        );
        let fetcher = Arc::new(HttpAssetFetcher::new(5).expect("Failed to create fetcher"));

        let service = Arc::new(
            KnobGalleryService::start(catalog.clone(), source, fetcher, settings)
                .expect("Failed to start service"),
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = make_app(ServerState::new(service.clone()));

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            catalog,
            download_dir,
            service,
            _temp_db_dir: temp_db_dir,
            _temp_download_dir: temp_download_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Spawns a server and runs a complete crawl of the fake gallery.
    pub async fn spawn_scraped() -> Self {
        let server = Self::spawn().await;
        server.service.start_scrape();
        server
            .wait_until("crawl to finish", |s| !s.service.scrape_status().is_running())
            .await;
        server
    }

    /// Polls `condition` until it holds, panicking after the settle timeout.
    pub async fn wait_until(&self, what: &str, condition: impl Fn(&Self) -> bool) {
        let start = std::time::Instant::now();
        while !condition(self) {
            if start.elapsed() > Duration::from_millis(SETTLE_TIMEOUT_MS) {
                panic!("Timed out waiting for {}", what);
            }
            tokio::time::sleep(Duration::from_millis(SETTLE_POLL_INTERVAL_MS)).await;
        }
    }

    /// Waits until no download is queued or running.
    pub async fn wait_for_downloads(&self) {
        self.wait_until("downloads to settle", |s| {
            let counters = s.service.status().downloads;
            counters.queued == 0 && counters.in_flight == 0
        })
        .await;
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/status", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.service.shutdown();
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
