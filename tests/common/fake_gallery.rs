//! A local stand-in for the WebKnobMan gallery.

use super::constants::*;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use tokio::net::TcpListener;

/// Contents served for the knob file of `id`.
pub fn knob_bytes(id: i64) -> Vec<u8> {
    format!("knob-file-{}", id).into_bytes()
}

fn thumbnail_bytes(id: &str) -> Vec<u8> {
    format!("thumbnail-{}", id).into_bytes()
}

fn listing() -> serde_json::Value {
    let mut entries: Vec<serde_json::Value> = GALLERY_KNOBS
        .iter()
        .map(|(id, file)| {
            json!({
                "id": id.to_string(),
                "file": file,
                "author": "tester",
                "license": "CC0",
                "date": "2024-03-01",
                "comment": format!("Knob number {}", id),
                "tags": "test",
                "size": "12KB",
            })
        })
        .collect();
    entries.push(json!({
        "id": MISSING_FILE_KNOB_ID,
        "file": MISSING_FILE_KNOB_NAME,
        "date": "2024-03-02",
    }));
    // Unidentifiable entries are skipped by the crawler.
    entries.push(json!({ "file": "no-id.knob" }));
    serde_json::Value::Array(entries)
}

async fn gallery(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("m").map(String::as_str) {
        Some("list") => Json(listing()).into_response(),
        Some("get") => {
            let id = params.get("n").and_then(|n| n.parse::<i64>().ok());
            match id {
                Some(id) if GALLERY_KNOBS.iter().any(|(known, _)| *known == id) => {
                    knob_bytes(id).into_response()
                }
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn thumbnail(Path(file): Path<String>) -> Response {
    match file.strip_suffix(".png") {
        Some(id) => thumbnail_bytes(id).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve the fake gallery on a random port. Returns the gallery page URL and
/// the thumbnail base URL.
pub async fn spawn_fake_gallery() -> (String, String) {
    let router = Router::new()
        .route("/gallery.php", get(gallery))
        .route("/gal/{file}", get(thumbnail));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake gallery");
    let addr = listener
        .local_addr()
        .expect("Failed to get fake gallery address");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Fake gallery failed");
    });

    (
        format!("http://{}/gallery.php", addr),
        format!("http://{}/gal", addr),
    )
}
