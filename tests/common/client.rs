//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server endpoint. When routes or
//! request formats change, update only this file.

#![allow(dead_code)]

use super::constants::*;
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;

pub struct TestClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn post(&self, path: &str) -> Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("POST request failed")
    }

    async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .expect("POST request failed")
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub async fn list_knobs(&self, page: usize, limit: usize) -> Response {
        self.get(&format!("/data/knobs?page={}&limit={}", page, limit))
            .await
    }

    pub async fn list_knobs_default(&self) -> Response {
        self.get("/data/knobs").await
    }

    pub async fn get_knob(&self, id: i64) -> Response {
        self.get(&format!("/data/knobs/{}", id)).await
    }

    // ========================================================================
    // Crawl
    // ========================================================================

    pub async fn start_scrape(&self) -> Response {
        self.post("/data/scrape").await
    }

    pub async fn scrape_status(&self) -> Response {
        self.get("/data/scrape/status").await
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    pub async fn download_knob(&self, id: i64) -> Response {
        self.post(&format!("/data/knobs/{}/download", id)).await
    }

    pub async fn batch_download(&self, ids: &[i64]) -> Response {
        self.post_json("/data/knobs/batch-download", &serde_json::json!(ids))
            .await
    }

    pub async fn download_thumbnails(&self) -> Response {
        self.post("/data/thumbnails/download").await
    }

    pub async fn status(&self) -> Response {
        self.get("/status").await
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub async fn settings(&self) -> Response {
        self.get("/settings").await
    }

    pub async fn default_settings(&self) -> Response {
        self.get("/settings/defaults").await
    }

    pub async fn update_settings(&self, update: &Value) -> Response {
        self.post_json("/settings/update", update).await
    }
}
