//! Download Manager module
//!
//! Schedules knob file and thumbnail downloads onto a bounded worker pool,
//! with deduplication of concurrent requests, retry with exponential backoff
//! and atomic writes into the download directory.

mod fetcher;
mod manager;
mod models;
mod queue;
mod retry_policy;
mod storage;

pub use fetcher::{AssetFetcher, HttpAssetFetcher};
pub use manager::DownloadManager;
pub use models::*;
pub use retry_policy::RetryPolicy;
