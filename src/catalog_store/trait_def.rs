//! CatalogStore trait definition.

use anyhow::Result;

use super::models::{AssetId, AssetRecord, CatalogPage, DownloadState};

/// Durable mapping from asset id to its catalog record.
///
/// Writes are atomic per record: readers never observe a half-applied upsert or
/// download-state change. Crawl upserts only touch gallery metadata, while the
/// download fields are owned by the download manager.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a record by id.
    fn get(&self, id: AssetId) -> Result<Option<AssetRecord>>;

    /// List records ordered by id ascending. `page_number` is 1-based.
    fn list_page(&self, page_number: usize, page_size: usize) -> Result<CatalogPage>;

    /// Number of records in the catalog.
    fn count(&self) -> Result<usize>;

    /// All ids, ascending.
    fn list_ids(&self) -> Result<Vec<AssetId>>;

    /// Records currently marked as downloaded.
    fn list_downloaded(&self) -> Result<Vec<AssetRecord>>;

    // =========================================================================
    // Crawl writes (metadata only)
    // =========================================================================

    /// Insert the record, or merge its metadata into the existing row with the same id.
    ///
    /// An existing row keeps its download state, local paths and first-seen time.
    fn upsert(&self, record: &AssetRecord) -> Result<()>;

    /// Upsert a batch of records in one transaction. Returns how many were written.
    fn upsert_many(&self, records: &[AssetRecord]) -> Result<usize>;

    // =========================================================================
    // Download writes (download fields only)
    // =========================================================================

    /// Set the download state of a record, and the local file path when given.
    ///
    /// Returns false if no record has this id.
    fn update_download_state(
        &self,
        id: AssetId,
        state: &DownloadState,
        local_file_path: Option<&str>,
    ) -> Result<bool>;

    /// Record where the thumbnail of an asset was written.
    fn set_thumbnail_path(&self, id: AssetId, path: &str) -> Result<bool>;

    /// Move every `Downloading` record back to `NotDownloaded`. Returns the number reset.
    fn reset_interrupted_downloads(&self) -> Result<usize>;
}
