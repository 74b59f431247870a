//! Two-lane task queue.
//!
//! Single requests go to the priority lane. Batch requests are held as compact
//! id lists and released into the batch lane one chunk at a time, so a large
//! batch never holds more than one chunk of materialized tasks and a single
//! request arriving mid-batch is served before the rest of the batch.

use super::{DownloadKind, DownloadTask, TaskOrigin};
use crate::catalog_store::AssetId;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Batch work not yet released into the batch lane.
struct PendingBatch {
    kind: DownloadKind,
    ids: VecDeque<AssetId>,
    max_attempts: u32,
    download_dir: Arc<PathBuf>,
}

#[derive(Default)]
pub struct TaskQueue {
    priority: VecDeque<DownloadTask>,
    batch: VecDeque<DownloadTask>,
    pending: VecDeque<PendingBatch>,
    len: usize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting, including unreleased batch items.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Queue a task at the back of the lane of its origin.
    pub fn push(&mut self, task: DownloadTask) {
        match task.origin {
            TaskOrigin::Single => self.priority.push_back(task),
            TaskOrigin::Batch => self.batch.push_back(task),
        }
        self.len += 1;
    }

    /// Queue a batch of ids, released later in chunks.
    pub fn push_batch(
        &mut self,
        kind: DownloadKind,
        ids: Vec<AssetId>,
        max_attempts: u32,
        download_dir: Arc<PathBuf>,
    ) {
        if ids.is_empty() {
            return;
        }
        self.len += ids.len();
        self.pending.push_back(PendingBatch {
            kind,
            ids: ids.into(),
            max_attempts,
            download_dir,
        });
    }

    /// Take the next task. Priority tasks first, then batch tasks; when the
    /// batch lane is empty the next `chunk_size` pending ids are released.
    pub fn pop(&mut self, chunk_size: usize) -> Option<DownloadTask> {
        let task = match self.priority.pop_front() {
            Some(task) => Some(task),
            None => {
                if self.batch.is_empty() {
                    self.release_chunk(chunk_size.max(1));
                }
                self.batch.pop_front()
            }
        };
        if task.is_some() {
            self.len -= 1;
        }
        task
    }

    fn release_chunk(&mut self, chunk_size: usize) {
        let Some(pending) = self.pending.front_mut() else {
            return;
        };
        let take = chunk_size.min(pending.ids.len());
        for asset_id in pending.ids.drain(..take) {
            self.batch.push_back(DownloadTask {
                asset_id,
                kind: pending.kind,
                attempt: 0,
                max_attempts: pending.max_attempts,
                origin: TaskOrigin::Batch,
                download_dir: pending.download_dir.clone(),
            });
        }
        debug!(
            "Released {} {} task(s) from batch, {} left in it",
            take,
            pending.kind.as_str(),
            pending.ids.len()
        );
        if pending.ids.is_empty() {
            self.pending.pop_front();
        }
    }
}
