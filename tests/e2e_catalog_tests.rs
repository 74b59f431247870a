//! End-to-end tests for the crawl and catalog endpoints
//!
//! Tests for `/data/scrape*`, `/data/knobs` and `/data/knobs/{id}`.

mod common;

use common::{
    TestClient, TestServer, GALLERY_KNOBS, GALLERY_KNOB_COUNT, SETTLE_POLL_INTERVAL_MS,
    SETTLE_TIMEOUT_MS, UNKNOWN_KNOB_ID,
};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

async fn wait_for_scrape(client: &TestClient) -> Value {
    let start = std::time::Instant::now();
    loop {
        let state: Value = client.scrape_status().await.json().await.unwrap();
        if state["phase"]["status"] != "RUNNING" {
            return state;
        }
        if start.elapsed() > Duration::from_millis(SETTLE_TIMEOUT_MS) {
            panic!("Crawl did not finish: {}", state);
        }
        tokio::time::sleep(Duration::from_millis(SETTLE_POLL_INTERVAL_MS)).await;
    }
}

// ============================================================================
// Crawl
// ============================================================================

#[tokio::test]
async fn test_scrape_status_is_idle_before_first_crawl() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.scrape_status().await;
    assert_eq!(response.status(), StatusCode::OK);

    let state: Value = response.json().await.unwrap();
    assert_eq!(state["phase"]["status"], "IDLE");
    assert_eq!(state["completed_items"], 0);
    assert!(state["started_at"].is_null());
}

#[tokio::test]
async fn test_scrape_fills_catalog() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.start_scrape().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["accepted"], true);

    let state = wait_for_scrape(&client).await;
    assert_eq!(state["phase"]["status"], "SUCCEEDED");
    assert_eq!(state["completed_items"], GALLERY_KNOB_COUNT);
    assert_eq!(state["total_items_known"], GALLERY_KNOB_COUNT);
    assert!(state["finished_at"].is_i64());

    assert_eq!(server.catalog.count().unwrap(), GALLERY_KNOB_COUNT);
}

#[tokio::test]
async fn test_scrape_can_run_again_after_success() {
    let server = TestServer::spawn_scraped().await;
    let client = TestClient::new(server.base_url.clone());

    let body: Value = client.start_scrape().await.json().await.unwrap();
    assert_eq!(body["accepted"], true);

    let state = wait_for_scrape(&client).await;
    assert_eq!(state["phase"]["status"], "SUCCEEDED");
    assert_eq!(server.catalog.count().unwrap(), GALLERY_KNOB_COUNT);
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_empty_catalog() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.list_knobs_default().await;
    assert_eq!(response.status(), StatusCode::OK);

    let listing: Value = response.json().await.unwrap();
    assert_eq!(listing["records"].as_array().unwrap().len(), 0);
    assert_eq!(listing["total_count"], 0);
    assert_eq!(listing["total_pages"], 1);
    assert_eq!(listing["page"], 1);
    assert_eq!(listing["page_size"], 50);
}

#[tokio::test]
async fn test_list_pages_through_catalog_in_id_order() {
    let server = TestServer::spawn_scraped().await;
    let client = TestClient::new(server.base_url.clone());

    let first: Value = client.list_knobs(1, 3).await.json().await.unwrap();
    assert_eq!(first["total_count"], GALLERY_KNOB_COUNT);
    assert_eq!(first["total_pages"], 2);
    let ids: Vec<i64> = first["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![101, 102, 103]);

    let second: Value = client.list_knobs(2, 3).await.json().await.unwrap();
    let records = second["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 104);

    let past_end: Value = client.list_knobs(3, 3).await.json().await.unwrap();
    assert_eq!(past_end["records"].as_array().unwrap().len(), 0);
    assert_eq!(past_end["total_count"], GALLERY_KNOB_COUNT);
}

#[tokio::test]
async fn test_list_rejects_invalid_paging() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    assert_eq!(client.list_knobs(0, 10).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(client.list_knobs(1, 0).await.status(), StatusCode::BAD_REQUEST);

    let response = client.list_knobs(1, 101).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("page size"));
}

// ============================================================================
// Single knob
// ============================================================================

#[tokio::test]
async fn test_get_knob_returns_gallery_metadata() {
    let server = TestServer::spawn_scraped().await;
    let client = TestClient::new(server.base_url.clone());

    let (id, file_name) = GALLERY_KNOBS[0];
    let response = client.get_knob(id).await;
    assert_eq!(response.status(), StatusCode::OK);

    let knob: Value = response.json().await.unwrap();
    assert_eq!(knob["id"], id);
    assert_eq!(knob["source_file_name"], file_name);
    assert_eq!(knob["author"], "tester");
    assert_eq!(knob["license"], "CC0");
    assert_eq!(knob["published_date"], "2024-03-01");
    assert_eq!(knob["size_label"], "12KB");
    assert_eq!(knob["download_state"]["status"], "NOT_DOWNLOADED");
    assert!(knob["local_file_path"].is_null());
    assert!(knob["download_source_url"]
        .as_str()
        .unwrap()
        .contains("m=get&n=101"));
}

#[tokio::test]
async fn test_get_unknown_knob_returns_404() {
    let server = TestServer::spawn_scraped().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_knob(UNKNOWN_KNOB_ID).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("9999"));
}
