//! Small helpers for declaring SQLite schemas as versioned constants.

mod versioned_schema;

pub use versioned_schema::{Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION};
