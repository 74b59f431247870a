//! SQLite-backed catalog store.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use crate::sqlite_persistence::VersionedSchema;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const UPSERT_SQL: &str = r#"INSERT INTO assets (
        id, source_file_name, author, license, published_date, comment, tags,
        size_label, thumbnail_source_url, download_source_url, local_file_path,
        local_thumbnail_path, download_state, failure_reason, first_seen_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
    ON CONFLICT(id) DO UPDATE SET
        source_file_name = excluded.source_file_name,
        author = excluded.author,
        license = excluded.license,
        published_date = excluded.published_date,
        comment = excluded.comment,
        tags = excluded.tags,
        size_label = excluded.size_label,
        thumbnail_source_url = excluded.thumbnail_source_url,
        download_source_url = excluded.download_source_url,
        updated_at = excluded.updated_at"#;

/// SQLite-backed catalog store.
///
/// All access goes through a single connection guarded by a mutex, so every
/// statement (and every upsert batch transaction) is applied in isolation.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open (or create) the catalog database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database at {:?}", db_path))?;

        VersionedSchema::open_or_migrate(&conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |r| r.get(0))?;
        info!("Opened catalog at {:?}: {} assets", db_path, count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        VersionedSchema::open_or_migrate(&conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<AssetRecord> {
        Ok(AssetRecord {
            id: row.get("id")?,
            source_file_name: row.get("source_file_name")?,
            author: row.get("author")?,
            license: row.get("license")?,
            published_date: row.get("published_date")?,
            comment: row.get("comment")?,
            tags: row.get("tags")?,
            size_label: row.get("size_label")?,
            thumbnail_source_url: row.get("thumbnail_source_url")?,
            download_source_url: row.get("download_source_url")?,
            local_file_path: row.get("local_file_path")?,
            local_thumbnail_path: row.get("local_thumbnail_path")?,
            download_state: DownloadState::from_db(
                &row.get::<_, String>("download_state")?,
                row.get("failure_reason")?,
            ),
            first_seen_at: row.get("first_seen_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn upsert_with(conn: &Connection, record: &AssetRecord, now: i64) -> Result<()> {
        conn.execute(
            UPSERT_SQL,
            params![
                record.id,
                record.source_file_name,
                record.author,
                record.license,
                record.published_date,
                record.comment,
                record.tags,
                record.size_label,
                record.thumbnail_source_url,
                record.download_source_url,
                record.local_file_path,
                record.local_thumbnail_path,
                record.download_state.as_db_str(),
                record.download_state.failure_reason(),
                record.first_seen_at,
                now,
            ],
        )?;
        Ok(())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn get(&self, id: AssetId) -> Result<Option<AssetRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT * FROM assets WHERE id = ?1",
                [id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn list_page(&self, page_number: usize, page_size: usize) -> Result<CatalogPage> {
        if page_number == 0 || page_size == 0 {
            bail!(
                "Invalid page request: page {} with size {}",
                page_number,
                page_size
            );
        }
        let conn = self.conn.lock().unwrap();
        let total_count: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |r| r.get(0))?;

        // Offsets that overflow or lie past the last row yield an empty page.
        let offset = (page_number - 1)
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok())
            .filter(|o| *o < total_count);
        let Some(offset) = offset else {
            return Ok(CatalogPage {
                records: Vec::new(),
                total_count: total_count as usize,
            });
        };
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare("SELECT * FROM assets ORDER BY id ASC LIMIT ?1 OFFSET ?2")?;
        let records = stmt
            .query_map(params![limit, offset], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CatalogPage {
            records,
            total_count: total_count as usize,
        })
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn list_ids(&self) -> Result<Vec<AssetId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM assets ORDER BY id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<AssetId>>>()?;
        Ok(ids)
    }

    fn list_downloaded(&self) -> Result<Vec<AssetRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM assets WHERE download_state = 'DOWNLOADED' ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn upsert(&self, record: &AssetRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::upsert_with(&conn, record, Self::now())
    }

    fn upsert_many(&self, records: &[AssetRecord]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Self::now();
        for record in records {
            Self::upsert_with(&tx, record, now)
                .with_context(|| format!("Failed to upsert asset {}", record.id))?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn update_download_state(
        &self,
        id: AssetId,
        state: &DownloadState,
        local_file_path: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE assets
               SET download_state = ?2,
                   failure_reason = ?3,
                   local_file_path = CASE WHEN ?2 = 'DOWNLOADED'
                       THEN COALESCE(?4, local_file_path) ELSE NULL END,
                   updated_at = ?5
               WHERE id = ?1"#,
            params![
                id,
                state.as_db_str(),
                state.failure_reason(),
                local_file_path,
                Self::now(),
            ],
        )?;
        Ok(updated > 0)
    }

    fn set_thumbnail_path(&self, id: AssetId, path: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE assets SET local_thumbnail_path = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, path, Self::now()],
        )?;
        Ok(updated > 0)
    }

    fn reset_interrupted_downloads(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let reset = conn.execute(
            r#"UPDATE assets
               SET download_state = 'NOT_DOWNLOADED', failure_reason = NULL,
                   local_file_path = NULL, updated_at = ?1
               WHERE download_state = 'DOWNLOADING'"#,
            params![Self::now()],
        )?;
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_record(id: AssetId, author: &str) -> AssetRecord {
        let mut record = AssetRecord::from_metadata(id, format!("knob_{}.knob", id), "CC0", "2024-01-01");
        record.author = Some(author.to_string());
        record.tags = Some("metal".to_string());
        record
    }

    #[test]
    fn test_create_new_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");

        let store = SqliteCatalogStore::new(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::new(&db_path).unwrap();
            store.upsert(&make_record(7, "alice")).unwrap();
        }

        let store = SqliteCatalogStore::new(&db_path).unwrap();
        assert_eq!(store.get(7).unwrap().unwrap().author.as_deref(), Some("alice"));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        assert!(store.get(404).unwrap().is_none());
    }

    #[test]
    fn test_upsert_updates_metadata_but_keeps_download_fields() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        store.upsert(&make_record(1, "alice")).unwrap();
        store
            .update_download_state(1, &DownloadState::Downloaded, Some("/tmp/knobs/1_knob_1.knob"))
            .unwrap();
        store.set_thumbnail_path(1, "/tmp/thumbnails/1.png").unwrap();
        let first_seen = store.get(1).unwrap().unwrap().first_seen_at;

        let mut rescraped = make_record(1, "bob");
        rescraped.tags = Some("plastic,red".to_string());
        rescraped.first_seen_at = first_seen + 1000;
        store.upsert(&rescraped).unwrap();

        let record = store.get(1).unwrap().unwrap();
        assert_eq!(record.author.as_deref(), Some("bob"));
        assert_eq!(record.tags.as_deref(), Some("plastic,red"));
        assert_eq!(record.download_state, DownloadState::Downloaded);
        assert_eq!(record.local_file_path.as_deref(), Some("/tmp/knobs/1_knob_1.knob"));
        assert_eq!(record.local_thumbnail_path.as_deref(), Some("/tmp/thumbnails/1.png"));
        assert_eq!(record.first_seen_at, first_seen);
    }

    #[test]
    fn test_upsert_many_with_duplicate_ids_keeps_last() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let written = store
            .upsert_many(&[make_record(3, "first"), make_record(3, "second"), make_record(4, "x")])
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get(3).unwrap().unwrap().author.as_deref(), Some("second"));
    }

    #[test]
    fn test_list_page_sizes_and_order() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        // Insert out of order to check ordering by id.
        let records: Vec<_> = (1..=120).rev().map(|id| make_record(id, "a")).collect();
        store.upsert_many(&records).unwrap();

        let sizes: Vec<usize> = (1..=4)
            .map(|page| store.list_page(page, 50).unwrap().records.len())
            .collect();
        assert_eq!(sizes, vec![50, 50, 20, 0]);

        let first = store.list_page(1, 50).unwrap();
        assert_eq!(first.total_count, 120);
        assert_eq!(first.records.first().unwrap().id, 1);
        assert_eq!(first.records.last().unwrap().id, 50);
        assert_eq!(store.list_page(2, 50).unwrap().records[0].id, 51);
    }

    #[test]
    fn test_list_page_far_past_end_is_empty() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let records: Vec<_> = (1..=120).map(|id| make_record(id, "a")).collect();
        store.upsert_many(&records).unwrap();

        for page in [1usize << 58, usize::MAX] {
            let result = store.list_page(page, 50).unwrap();
            assert!(result.records.is_empty(), "page {}", page);
            assert_eq!(result.total_count, 120);
        }
        assert!(store.list_page(2, usize::MAX).unwrap().records.is_empty());
        assert_eq!(store.list_page(1, usize::MAX).unwrap().records.len(), 120);
    }

    #[test]
    fn test_list_page_rejects_zero() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        assert!(store.list_page(0, 10).is_err());
        assert!(store.list_page(1, 0).is_err());
    }

    #[test]
    fn test_update_download_state_failed_and_missing() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        store.upsert(&make_record(9, "a")).unwrap();

        let failed = DownloadState::Failed {
            reason: "connection refused".to_string(),
        };
        assert!(store.update_download_state(9, &failed, None).unwrap());
        assert_eq!(store.get(9).unwrap().unwrap().download_state, failed);

        assert!(!store
            .update_download_state(10, &DownloadState::Downloading, None)
            .unwrap());
    }

    #[test]
    fn test_reset_interrupted_downloads() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        store
            .upsert_many(&[make_record(1, "a"), make_record(2, "b"), make_record(3, "c")])
            .unwrap();
        store.update_download_state(1, &DownloadState::Downloading, None).unwrap();
        store.update_download_state(2, &DownloadState::Downloaded, Some("/x")).unwrap();

        assert_eq!(store.reset_interrupted_downloads().unwrap(), 1);
        assert_eq!(store.get(1).unwrap().unwrap().download_state, DownloadState::NotDownloaded);
        assert_eq!(store.get(2).unwrap().unwrap().download_state, DownloadState::Downloaded);
        assert_eq!(store.list_downloaded().unwrap().len(), 1);
        assert_eq!(store.list_ids().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_leaving_downloaded_clears_local_file_path() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        store.upsert(&make_record(2, "a")).unwrap();

        let failed = DownloadState::Failed {
            reason: "timeout".to_string(),
        };
        for state in [DownloadState::NotDownloaded, DownloadState::Downloading, failed] {
            store
                .update_download_state(2, &DownloadState::Downloaded, Some("/gone/2.knob"))
                .unwrap();
            store.update_download_state(2, &state, None).unwrap();

            let record = store.get(2).unwrap().unwrap();
            assert_eq!(record.download_state, state);
            assert_eq!(record.local_file_path, None);
        }

        // Downloaded without a new path keeps the one already recorded.
        store
            .update_download_state(2, &DownloadState::Downloaded, Some("/dl/2.knob"))
            .unwrap();
        store.update_download_state(2, &DownloadState::Downloaded, None).unwrap();
        assert_eq!(
            store.get(2).unwrap().unwrap().local_file_path.as_deref(),
            Some("/dl/2.knob")
        );
    }
}
