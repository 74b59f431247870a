//! Database schema for catalog.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// Knob assets, keyed by gallery id.
const ASSETS_TABLE_V0: Table = Table {
    name: "assets",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("source_file_name", &SqlType::Text, non_null = true),
        sqlite_column!("author", &SqlType::Text),
        sqlite_column!("license", &SqlType::Text, non_null = true),
        sqlite_column!("published_date", &SqlType::Text, non_null = true),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("tags", &SqlType::Text),
        sqlite_column!("size_label", &SqlType::Text),
        sqlite_column!("thumbnail_source_url", &SqlType::Text),
        sqlite_column!("download_source_url", &SqlType::Text),
        sqlite_column!("local_file_path", &SqlType::Text),
        sqlite_column!("local_thumbnail_path", &SqlType::Text),
        sqlite_column!(
            "download_state",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'NOT_DOWNLOADED'")
        ),
        sqlite_column!("failure_reason", &SqlType::Text),
        sqlite_column!("first_seen_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_assets_download_state", "download_state")],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ASSETS_TABLE_V0],
    migration: None,
}];
