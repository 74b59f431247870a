//! KnobGallery server library.
//!
//! Crawls the WebKnobMan gallery into a local catalog and downloads knob files
//! and thumbnails on demand or in bulk.

pub mod catalog_store;
pub mod config;
pub mod download_manager;
pub mod gallery;
pub mod scrape;
pub mod server;
pub mod service;
pub mod sqlite_persistence;
pub mod status;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use server::{make_app, run_server, ServerState};
pub use service::{KnobGalleryService, ServiceError};
