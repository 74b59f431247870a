//! Gallery source adapter.
//!
//! A gallery is read as a sequence of pages. Each page yields raw entries and
//! optionally a cursor to the next page; the sequence ends when no cursor is
//! returned.

mod webknobman;

pub use webknobman::WebKnobManSource;

use crate::catalog_store::{AssetId, AssetRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while reading the gallery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Gallery unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed gallery page: {0}")]
    Parse(String),
}

/// One knob as listed by the gallery, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub id: AssetId,
    pub file_name: String,
    pub author: Option<String>,
    pub license: String,
    pub published_date: String,
    pub comment: Option<String>,
    pub tags: Option<String>,
    pub size_label: Option<String>,
    pub thumbnail_url: Option<String>,
    pub download_url: Option<String>,
}

impl RawEntry {
    /// Build the catalog record for this entry, with no download state.
    pub fn into_record(self) -> AssetRecord {
        let mut record =
            AssetRecord::from_metadata(self.id, self.file_name, self.license, self.published_date);
        record.author = self.author;
        record.comment = self.comment;
        record.tags = self.tags;
        record.size_label = self.size_label;
        record.thumbnail_source_url = self.thumbnail_url;
        record.download_source_url = self.download_url;
        record
    }
}

/// One page of gallery entries.
#[derive(Debug, Clone, Default)]
pub struct GalleryPage {
    pub entries: Vec<RawEntry>,
    /// Cursor of the following page. `None` on the last page.
    pub next_cursor: Option<String>,
    /// Total number of entries in the gallery, when the source knows it.
    pub total_hint: Option<usize>,
}

#[async_trait]
pub trait GallerySource: Send + Sync {
    /// Fetch the page at `cursor`. `None` requests the first page.
    async fn fetch_page(&self, cursor: Option<String>) -> Result<GalleryPage, SourceError>;
}
