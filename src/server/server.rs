use std::future::Future;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::state::{GuardedService, ServerState};
use crate::catalog_store::AssetId;
use crate::config::SettingsUpdate;
use crate::service::{ServiceError, DEFAULT_PAGE_SIZE};
use crate::status::StatusSnapshot;

fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ServiceError::Internal(e) => {
            error!("Request failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "detail": err.to_string() }))).into_response()
}

fn json_or_error<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(err),
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Deserialize)]
struct ListQuery {
    page: Option<usize>,
    limit: Option<usize>,
}

async fn list_knobs(State(service): State<GuardedService>, Query(query): Query<ListQuery>) -> Response {
    json_or_error(service.list_catalog(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    ))
}

async fn get_knob(State(service): State<GuardedService>, Path(id): Path<AssetId>) -> Response {
    json_or_error(service.get_asset(id))
}

// =============================================================================
// Crawl
// =============================================================================

async fn start_scrape(State(service): State<GuardedService>) -> Response {
    let outcome = service.start_scrape();
    let message = if outcome.accepted {
        "Started scraping gallery"
    } else {
        "Scraping is already in progress"
    };
    Json(json!({
        "message": message,
        "accepted": outcome.accepted,
        "state": outcome.state,
    }))
    .into_response()
}

async fn get_scrape_status(State(service): State<GuardedService>) -> Response {
    Json(service.scrape_status()).into_response()
}

// =============================================================================
// Downloads
// =============================================================================

async fn download_knob(State(service): State<GuardedService>, Path(id): Path<AssetId>) -> Response {
    json_or_error(service.request_download(id))
}

async fn batch_download(
    State(service): State<GuardedService>,
    Json(ids): Json<Vec<AssetId>>,
) -> Response {
    json_or_error(service.request_batch_download(&ids))
}

async fn download_thumbnails(State(service): State<GuardedService>) -> Response {
    json_or_error(service.request_all_thumbnails())
}

#[derive(Serialize)]
struct StatusResponse {
    uptime_secs: u64,
    #[serde(flatten)]
    snapshot: StatusSnapshot,
}

async fn get_status(State(state): State<ServerState>) -> Response {
    Json(StatusResponse {
        uptime_secs: state.start_time.elapsed().as_secs(),
        snapshot: state.service.status(),
    })
    .into_response()
}

// =============================================================================
// Settings
// =============================================================================

async fn get_settings(State(service): State<GuardedService>) -> Response {
    Json(service.settings()).into_response()
}

async fn get_default_settings(State(service): State<GuardedService>) -> Response {
    Json(service.default_settings()).into_response()
}

async fn update_settings(
    State(service): State<GuardedService>,
    Json(update): Json<SettingsUpdate>,
) -> Response {
    json_or_error(service.update_settings(update))
}

pub fn make_app(state: ServerState) -> Router {
    let data_routes: Router<ServerState> = Router::new()
        .route("/knobs", get(list_knobs))
        .route("/knobs/batch-download", post(batch_download))
        .route("/knobs/{id}", get(get_knob))
        .route("/knobs/{id}/download", post(download_knob))
        .route("/scrape", post(start_scrape))
        .route("/scrape/status", get(get_scrape_status))
        .route("/thumbnails/download", post(download_thumbnails));

    let settings_routes: Router<ServerState> = Router::new()
        .route("/", get(get_settings))
        .route("/update", post(update_settings))
        .route("/defaults", get(get_default_settings));

    Router::new()
        .route("/status", get(get_status))
        .nest("/data", data_routes)
        .nest("/settings", settings_routes)
        .with_state(state)
}

/// Serve the app on `port` until `shutdown` resolves.
pub async fn run_server(
    state: ServerState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
