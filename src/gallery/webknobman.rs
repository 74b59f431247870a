//! WebKnobMan gallery client.
//!
//! The gallery publishes its whole listing as one JSON array at `?m=list`.

use super::{GalleryPage, GallerySource, RawEntry, SourceError};
use crate::catalog_store::AssetId;
use crate::config::GallerySettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_LICENSE: &str = "CC0";

pub struct WebKnobManSource {
    client: reqwest::Client,
    gallery_url: String,
    thumbnail_base_url: String,
}

impl WebKnobManSource {
    pub fn new(settings: &GallerySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("Failed to build gallery HTTP client")?;

        Ok(Self {
            client,
            gallery_url: settings.gallery_url.clone(),
            thumbnail_base_url: settings.thumbnail_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn list_url(&self) -> String {
        format!("{}?m=list", self.gallery_url)
    }

    fn thumbnail_url(&self, id: AssetId) -> String {
        format!("{}/{}.png", self.thumbnail_base_url, id)
    }

    fn download_url(&self, id: AssetId, file_name: &str) -> String {
        format!(
            "{}?m=get&n={}&t=bin&f={}",
            self.gallery_url,
            id,
            urlencoding::encode(file_name)
        )
    }

    /// Parse the listing body into entries. Entries that cannot be identified
    /// are skipped.
    fn parse_listing(&self, body: &[u8]) -> Result<Vec<RawEntry>, SourceError> {
        let text = String::from_utf8_lossy(body).replace('\t', " ");
        let items: Vec<Value> = serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(100).collect();
            SourceError::Parse(format!("{} (content starts with {:?})", e, preview))
        })?;

        let mut entries = Vec::with_capacity(items.len());
        for item in &items {
            match self.parse_entry(item) {
                Some(entry) => entries.push(entry),
                None => warn!("Skipping malformed gallery entry: {}", item),
            }
        }
        Ok(entries)
    }

    fn parse_entry(&self, item: &Value) -> Option<RawEntry> {
        let id = match item.get("id")? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse::<AssetId>().ok()?,
            _ => return None,
        };
        let file_name = item.get("file")?.as_str()?.to_string();
        if file_name.is_empty() {
            return None;
        }

        Some(RawEntry {
            id,
            thumbnail_url: Some(self.thumbnail_url(id)),
            download_url: Some(self.download_url(id, &file_name)),
            author: text_field(item, "author"),
            license: text_field(item, "license").unwrap_or_else(|| DEFAULT_LICENSE.to_string()),
            published_date: text_field(item, "date").unwrap_or_default(),
            comment: text_field(item, "comment"),
            tags: text_field(item, "tags"),
            size_label: text_field(item, "size"),
            file_name,
        })
    }
}

/// Read a scalar field as text. Empty strings and nulls count as absent.
fn text_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[async_trait]
impl GallerySource for WebKnobManSource {
    async fn fetch_page(&self, cursor: Option<String>) -> Result<GalleryPage, SourceError> {
        if let Some(cursor) = cursor {
            debug!("Ignoring cursor {} for single-page gallery", cursor);
        }

        let response = self
            .client
            .get(self.list_url())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let entries = self.parse_listing(&body)?;
        let total = entries.len();
        Ok(GalleryPage {
            entries,
            next_cursor: None,
            total_hint: Some(total),
        })
    }
}
