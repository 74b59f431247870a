//! Catalog record types.

use serde::{Deserialize, Serialize};

/// Identifier of a knob in the gallery. Stable across crawls.
pub type AssetId = i64;

/// Whether the knob file of an asset has been materialized locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadState {
    NotDownloaded,
    Downloading,
    Downloaded,
    Failed { reason: String },
}

impl DownloadState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DownloadState::NotDownloaded => "NOT_DOWNLOADED",
            DownloadState::Downloading => "DOWNLOADING",
            DownloadState::Downloaded => "DOWNLOADED",
            DownloadState::Failed { .. } => "FAILED",
        }
    }

    /// Rebuilds a state from its stored tag and optional failure reason.
    /// Unknown tags fall back to `NotDownloaded` so the asset stays retry-eligible.
    pub fn from_db(tag: &str, reason: Option<String>) -> Self {
        match tag {
            "DOWNLOADING" => DownloadState::Downloading,
            "DOWNLOADED" => DownloadState::Downloaded,
            "FAILED" => DownloadState::Failed {
                reason: reason.unwrap_or_default(),
            },
            _ => DownloadState::NotDownloaded,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            DownloadState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// One knob asset as persisted in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    /// File name as published in the gallery (e.g. `Chrome.knob`).
    pub source_file_name: String,
    pub author: Option<String>,
    pub license: String,
    pub published_date: String,
    pub comment: Option<String>,
    pub tags: Option<String>,
    pub size_label: Option<String>,
    pub thumbnail_source_url: Option<String>,
    pub download_source_url: Option<String>,
    pub local_file_path: Option<String>,
    pub local_thumbnail_path: Option<String>,
    pub download_state: DownloadState,
    /// Unix timestamp of the first crawl that saw this asset.
    pub first_seen_at: i64,
    /// Unix timestamp of the last metadata or download-state write.
    pub updated_at: i64,
}

impl AssetRecord {
    /// Creates a record carrying only gallery metadata, as produced by a crawl.
    pub fn from_metadata(
        id: AssetId,
        source_file_name: impl Into<String>,
        license: impl Into<String>,
        published_date: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id,
            source_file_name: source_file_name.into(),
            author: None,
            license: license.into(),
            published_date: published_date.into(),
            comment: None,
            tags: None,
            size_label: None,
            thumbnail_source_url: None,
            download_source_url: None,
            local_file_path: None,
            local_thumbnail_path: None,
            download_state: DownloadState::NotDownloaded,
            first_seen_at: now,
            updated_at: now,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.download_state == DownloadState::Downloaded
    }
}

/// One page of catalog records plus the total row count at query time.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub records: Vec<AssetRecord>,
    pub total_count: usize,
}
