//! Download task types.

use crate::catalog_store::AssetId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Which artifact of an asset a task materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    File,
    Thumbnail,
}

impl DownloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::File => "file",
            DownloadKind::Thumbnail => "thumbnail",
        }
    }
}

/// Where a task entered the queue. Single requests are served before batch work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    Single,
    Batch,
}

/// One unit of download work, owned by the manager from enqueue to terminal state.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub asset_id: AssetId,
    pub kind: DownloadKind,
    /// Failed attempts so far.
    pub attempt: u32,
    pub max_attempts: u32,
    pub origin: TaskOrigin,
    /// Download root captured when the task was scheduled.
    pub download_dir: Arc<PathBuf>,
}

impl DownloadTask {
    pub fn key(&self) -> TaskKey {
        (self.asset_id, self.kind)
    }
}

pub type TaskKey = (AssetId, DownloadKind);

/// Type of error encountered during download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorType {
    Connection, // Network error - retry
    Timeout,    // Request timeout - retry
    HttpStatus, // Non-2xx response - retry only for 408, 429 and 5xx
    NotFound,   // Unknown asset or missing source - NO retry
    Storage,    // Local file system error - NO retry
}

impl DownloadErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadErrorType::Connection => "connection",
            DownloadErrorType::Timeout => "timeout",
            DownloadErrorType::HttpStatus => "http_status",
            DownloadErrorType::NotFound => "not_found",
            DownloadErrorType::Storage => "storage",
        }
    }
}

/// A failed download attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} error: {message}", .error_type.as_str())]
pub struct DownloadError {
    pub error_type: DownloadErrorType,
    pub message: String,
    /// Response status for `HttpStatus` errors.
    pub status: Option<u16>,
}

impl DownloadError {
    pub fn new(error_type: DownloadErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status(status: u16) -> Self {
        Self {
            error_type: DownloadErrorType::HttpStatus,
            message: format!("unexpected HTTP status {}", status),
            status: Some(status),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(DownloadErrorType::NotFound, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(DownloadErrorType::Storage, message)
    }

    /// Returns true if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self.error_type {
            DownloadErrorType::Connection | DownloadErrorType::Timeout => true,
            DownloadErrorType::HttpStatus => self
                .status
                .is_some_and(|s| s == 408 || s == 429 || (500..600).contains(&s)),
            DownloadErrorType::NotFound | DownloadErrorType::Storage => false,
        }
    }
}

/// Lifecycle of a task as seen by callers holding a [`DownloadHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued { attempt: u32 },
    InFlight { attempt: u32 },
    RetryScheduled { attempt: u32, delay_ms: u64 },
    Succeeded { path: String },
    Failed { reason: String },
}

impl TaskStatus {
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self {
            TaskStatus::Succeeded { path } => Some(TaskOutcome::Succeeded { path: path.clone() }),
            TaskStatus::Failed { reason } => Some(TaskOutcome::Failed {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Terminal result of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskOutcome {
    Succeeded { path: String },
    Failed { reason: String },
}

/// Observer of one in-flight task. Cloning shares the same task.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    pub asset_id: AssetId,
    pub kind: DownloadKind,
    rx: tokio::sync::watch::Receiver<TaskStatus>,
}

impl DownloadHandle {
    pub(crate) fn new(
        asset_id: AssetId,
        kind: DownloadKind,
        rx: tokio::sync::watch::Receiver<TaskStatus>,
    ) -> Self {
        Self { asset_id, kind, rx }
    }

    pub fn status(&self) -> TaskStatus {
        self.rx.borrow().clone()
    }

    /// Wait for the task to reach a terminal state.
    pub async fn wait(mut self) -> TaskOutcome {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().outcome() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().outcome().unwrap_or(TaskOutcome::Failed {
                    reason: "download manager stopped".to_string(),
                });
            }
        }
    }
}

/// Answer to a single download request.
#[derive(Debug)]
pub enum DownloadRequestOutcome {
    /// The artifact is already on disk at this path; nothing was scheduled.
    AlreadyDownloaded(String),
    /// A new task was queued.
    Enqueued(DownloadHandle),
    /// A task for the same asset and kind was already pending; joined it.
    Joined(DownloadHandle),
    /// No catalog record has this id.
    UnknownAsset,
}

impl DownloadRequestOutcome {
    pub fn handle(&self) -> Option<&DownloadHandle> {
        match self {
            DownloadRequestOutcome::Enqueued(h) | DownloadRequestOutcome::Joined(h) => Some(h),
            _ => None,
        }
    }
}

/// Aggregate task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadCounters {
    pub queued: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}
