//! Download manager: request intake, scheduling and task execution.

use super::fetcher::AssetFetcher;
use super::queue::TaskQueue;
use super::retry_policy::RetryPolicy;
use super::storage;
use super::*;
use crate::catalog_store::{AssetId, AssetRecord, CatalogStore, DownloadState};
use crate::config::SettingsStore;
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of checking a request against the registry and the catalog.
enum Admission {
    Joined(DownloadHandle),
    Registered(DownloadHandle),
    AlreadyDownloaded(String),
    UnknownAsset,
}

/// Schedules file and thumbnail downloads onto a pool of workers.
///
/// Every task is registered under its (asset, kind) key from enqueue until it
/// reaches a terminal state, so concurrent requests for the same artifact join
/// the existing task instead of fetching twice.
pub struct DownloadManager {
    catalog: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn AssetFetcher>,
    settings: Arc<SettingsStore>,

    queue: Mutex<TaskQueue>,
    queue_changed: Notify,
    registry: Mutex<HashMap<TaskKey, watch::Sender<TaskStatus>>>,

    in_flight: AtomicUsize,
    retry_waiting: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,

    /// Liveness of each worker slot, indexed by worker number.
    workers: Mutex<Vec<bool>>,
    shutdown: CancellationToken,
}

impl DownloadManager {
    /// Recover interrupted downloads, then start the worker pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        catalog: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn AssetFetcher>,
        settings: Arc<SettingsStore>,
    ) -> Result<Arc<Self>> {
        let manager = Arc::new(Self {
            catalog,
            fetcher,
            settings,
            queue: Mutex::new(TaskQueue::new()),
            queue_changed: Notify::new(),
            registry: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            retry_waiting: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        });

        manager.recover_interrupted()?;
        manager.ensure_workers();
        Ok(manager)
    }

    /// Bring the catalog back in line with the disk after an unclean stop.
    fn recover_interrupted(&self) -> Result<()> {
        let reset = self.catalog.reset_interrupted_downloads()?;
        if reset > 0 {
            info!("Reset {} interrupted download(s) to not downloaded", reset);
        }

        let mut missing = 0;
        for record in self.catalog.list_downloaded()? {
            let on_disk = record
                .local_file_path
                .as_deref()
                .is_some_and(|p| Path::new(p).is_file());
            if !on_disk {
                self.catalog
                    .update_download_state(record.id, &DownloadState::NotDownloaded, None)?;
                missing += 1;
            }
        }
        if missing > 0 {
            warn!(
                "{} downloaded asset(s) no longer exist on disk, marked not downloaded",
                missing
            );
        }
        Ok(())
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Request one artifact of one asset, with priority over batch work.
    pub fn request_download(
        &self,
        asset_id: AssetId,
        kind: DownloadKind,
    ) -> Result<DownloadRequestOutcome> {
        let settings = self.settings.get();
        let admission = {
            let mut registry = self.registry.lock().unwrap();
            self.admit(&mut registry, asset_id, kind)?
        };

        let handle = match admission {
            Admission::Joined(handle) => {
                debug!(
                    "Joined pending {} download of asset {}",
                    kind.as_str(),
                    asset_id
                );
                return Ok(DownloadRequestOutcome::Joined(handle));
            }
            Admission::AlreadyDownloaded(path) => {
                return Ok(DownloadRequestOutcome::AlreadyDownloaded(path))
            }
            Admission::UnknownAsset => return Ok(DownloadRequestOutcome::UnknownAsset),
            Admission::Registered(handle) => handle,
        };

        self.queue.lock().unwrap().push(DownloadTask {
            asset_id,
            kind,
            attempt: 0,
            max_attempts: settings.download_retry_attempts,
            origin: TaskOrigin::Single,
            download_dir: Arc::new(settings.download_dir.clone()),
        });
        self.queue_changed.notify_waiters();
        info!("Queued {} download of asset {}", kind.as_str(), asset_id);

        Ok(DownloadRequestOutcome::Enqueued(handle))
    }

    /// Queue one task per id that is known, not yet on disk and not already
    /// pending. Returns how many tasks were queued.
    pub fn request_batch(&self, asset_ids: &[AssetId], kind: DownloadKind) -> Result<usize> {
        let settings = self.settings.get();
        let mut accepted = Vec::new();
        let mut failure = None;
        {
            let mut registry = self.registry.lock().unwrap();
            let mut seen = HashSet::new();
            for &asset_id in asset_ids {
                if !seen.insert(asset_id) {
                    continue;
                }
                match self.admit(&mut registry, asset_id, kind) {
                    Ok(Admission::Registered(_)) => accepted.push(asset_id),
                    Ok(Admission::UnknownAsset) => {
                        debug!("Skipping unknown asset {} in batch", asset_id)
                    }
                    Ok(_) => {}
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        let count = accepted.len();
        if count > 0 {
            self.queue.lock().unwrap().push_batch(
                kind,
                accepted,
                settings.download_retry_attempts,
                Arc::new(settings.download_dir.clone()),
            );
            self.queue_changed.notify_waiters();
            info!(
                "Queued batch of {} {} download(s) out of {} requested",
                count,
                kind.as_str(),
                asset_ids.len()
            );
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Queue a thumbnail download for every catalog record lacking one.
    pub fn request_all_thumbnails(&self) -> Result<usize> {
        let ids = self.catalog.list_ids()?;
        self.request_batch(&ids, DownloadKind::Thumbnail)
    }

    /// Decide what to do with a request. Registers a new task when needed.
    /// Called with the registry locked.
    fn admit(
        &self,
        registry: &mut HashMap<TaskKey, watch::Sender<TaskStatus>>,
        asset_id: AssetId,
        kind: DownloadKind,
    ) -> Result<Admission> {
        if self.shutdown.is_cancelled() {
            bail!(
                "Download manager is shut down, rejecting {} download of asset {}",
                kind.as_str(),
                asset_id
            );
        }
        let key = (asset_id, kind);
        if let Some(tx) = registry.get(&key) {
            return Ok(Admission::Joined(DownloadHandle::new(
                asset_id,
                kind,
                tx.subscribe(),
            )));
        }

        let Some(record) = self.catalog.get(asset_id)? else {
            return Ok(Admission::UnknownAsset);
        };
        if let Some(path) = materialized_path(&record, kind) {
            return Ok(Admission::AlreadyDownloaded(path));
        }

        if kind == DownloadKind::File {
            self.catalog
                .update_download_state(asset_id, &DownloadState::Downloading, None)?;
        }
        let (tx, rx) = watch::channel(TaskStatus::Queued { attempt: 0 });
        registry.insert(key, tx);
        Ok(Admission::Registered(DownloadHandle::new(asset_id, kind, rx)))
    }

    // =========================================================================
    // Observation and control
    // =========================================================================

    pub fn counters(&self) -> DownloadCounters {
        let queued =
            self.queue.lock().unwrap().len() + self.retry_waiting.load(Ordering::SeqCst);
        DownloadCounters {
            queued,
            in_flight: self.in_flight.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap().iter().filter(|w| **w).count()
    }

    /// Apply changed settings: resize the pool and re-check admission.
    pub fn on_settings_changed(self: &Arc<Self>) {
        self.ensure_workers();
        self.queue_changed.notify_waiters();
    }

    /// Stop all workers and pending retries. Requests made afterwards are
    /// rejected, and every pending handle resolves as failed.
    pub fn shutdown(&self) {
        info!("Download manager shutting down");
        self.shutdown.cancel();

        let pending: Vec<_> = self.registry.lock().unwrap().drain().collect();
        *self.queue.lock().unwrap() = TaskQueue::new();
        if !pending.is_empty() {
            warn!("Abandoning {} pending download(s)", pending.len());
        }
        for (_, tx) in pending {
            tx.send_replace(TaskStatus::Failed {
                reason: "download manager shut down".to_string(),
            });
        }
    }

    // =========================================================================
    // Workers
    // =========================================================================

    fn ensure_workers(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut slots = self.workers.lock().unwrap();
        let wanted = self.settings.get().max_download_workers;
        if slots.len() < wanted {
            slots.resize(wanted, false);
        }
        let mut spawned = 0;
        for (index, alive) in slots.iter_mut().enumerate().take(wanted) {
            if !*alive {
                *alive = true;
                spawned += 1;
                let this = self.clone();
                tokio::spawn(async move { this.run_worker(index).await });
            }
        }
        if spawned > 0 {
            debug!("Spawned {} download worker(s), pool size {}", spawned, wanted);
        }
    }

    async fn run_worker(self: Arc<Self>, index: usize) {
        debug!("Download worker {} started", index);
        loop {
            let task = tokio::select! {
                task = self.next_task(index) => task,
                _ = self.shutdown.cancelled() => {
                    self.workers.lock().unwrap()[index] = false;
                    break;
                }
            };
            let Some(task) = task else {
                debug!("Download worker {} retired", index);
                break;
            };

            self.execute(task).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.queue_changed.notify_waiters();
        }
    }

    /// Wait for a task this worker may run. Returns `None` when the pool
    /// shrank below this worker's index.
    async fn next_task(&self, index: usize) -> Option<DownloadTask> {
        loop {
            let notified = self.queue_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let settings = self.settings.get();
            if index >= settings.max_download_workers && self.retire(index) {
                return None;
            }
            {
                let mut queue = self.queue.lock().unwrap();
                if self.in_flight.load(Ordering::SeqCst) < settings.max_concurrent_downloads {
                    if let Some(task) = queue.pop(settings.download_batch_size) {
                        self.in_flight.fetch_add(1, Ordering::SeqCst);
                        return Some(task);
                    }
                }
            }

            notified.await;
        }
    }

    /// Mark a worker slot dead if the pool is still smaller than its index.
    fn retire(&self, index: usize) -> bool {
        let mut slots = self.workers.lock().unwrap();
        if index >= self.settings.get().max_download_workers {
            slots[index] = false;
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Task execution
    // =========================================================================

    async fn execute(self: &Arc<Self>, task: DownloadTask) {
        self.publish(
            task.key(),
            TaskStatus::InFlight {
                attempt: task.attempt,
            },
        );
        match self.attempt(&task).await {
            Ok(path) => self.complete(&task, path),
            Err(error) => self.handle_failure(task, error),
        }
    }

    async fn attempt(&self, task: &DownloadTask) -> Result<String, DownloadError> {
        let record = self
            .catalog
            .get(task.asset_id)
            .map_err(|e| DownloadError::storage(format!("catalog read failed: {:#}", e)))?
            .ok_or_else(|| {
                DownloadError::not_found(format!("asset {} is not in the catalog", task.asset_id))
            })?;

        let url = match task.kind {
            DownloadKind::File => record.download_source_url.as_deref(),
            DownloadKind::Thumbnail => record.thumbnail_source_url.as_deref(),
        }
        .ok_or_else(|| {
            DownloadError::not_found(format!(
                "asset {} has no {} source url",
                task.asset_id,
                task.kind.as_str()
            ))
        })?;

        let bytes = self.fetcher.fetch(url).await?;

        let target = storage::target_path(&task.download_dir, task.kind, &record);
        let written = storage::write_atomically(target.clone(), &bytes)
            .await
            .map_err(|e| DownloadError::storage(format!("writing {:?}: {}", target, e)))?;
        Ok(written.to_string_lossy().into_owned())
    }

    fn complete(&self, task: &DownloadTask, path: String) {
        let write = match task.kind {
            DownloadKind::File => self.catalog.update_download_state(
                task.asset_id,
                &DownloadState::Downloaded,
                Some(&path),
            ),
            DownloadKind::Thumbnail => self.catalog.set_thumbnail_path(task.asset_id, &path),
        };

        match write {
            Ok(_) => {
                info!(
                    "Downloaded {} of asset {} to {}",
                    task.kind.as_str(),
                    task.asset_id,
                    path
                );
                self.succeeded.fetch_add(1, Ordering::SeqCst);
                self.finish(task.key(), TaskStatus::Succeeded { path });
            }
            Err(e) => {
                let reason = format!("catalog update failed: {:#}", e);
                error!(
                    "Downloaded {} of asset {} but {}",
                    task.kind.as_str(),
                    task.asset_id,
                    reason
                );
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.finish(task.key(), TaskStatus::Failed { reason });
            }
        }
    }

    fn handle_failure(self: &Arc<Self>, mut task: DownloadTask, error: DownloadError) {
        let failed_attempts = task.attempt + 1;
        let policy = RetryPolicy::new(&self.settings.get());

        if policy.should_retry(&error, failed_attempts, task.max_attempts) {
            let delay = policy.backoff(failed_attempts);
            warn!(
                "{} download of asset {} failed (attempt {}/{}): {}, retrying in {}ms",
                task.kind.as_str(),
                task.asset_id,
                failed_attempts,
                task.max_attempts,
                error,
                delay.as_millis()
            );
            task.attempt = failed_attempts;
            self.publish(
                task.key(),
                TaskStatus::RetryScheduled {
                    attempt: failed_attempts,
                    delay_ms: delay.as_millis() as u64,
                },
            );
            self.schedule_retry(task, delay);
            return;
        }

        let reason = error.to_string();
        error!(
            "{} download of asset {} failed permanently after {} attempt(s): {}",
            task.kind.as_str(),
            task.asset_id,
            failed_attempts,
            reason
        );
        if task.kind == DownloadKind::File {
            let state = DownloadState::Failed {
                reason: reason.clone(),
            };
            if let Err(e) = self.catalog.update_download_state(task.asset_id, &state, None) {
                error!("Failed to record failure of asset {}: {:#}", task.asset_id, e);
            }
        }
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.finish(task.key(), TaskStatus::Failed { reason });
    }

    fn schedule_retry(self: &Arc<Self>, task: DownloadTask, delay: std::time::Duration) {
        self.retry_waiting.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    this.publish(task.key(), TaskStatus::Queued { attempt: task.attempt });
                    {
                        let mut queue = this.queue.lock().unwrap();
                        queue.push(task);
                        this.retry_waiting.fetch_sub(1, Ordering::SeqCst);
                    }
                    this.queue_changed.notify_waiters();
                }
                _ = this.shutdown.cancelled() => {
                    this.retry_waiting.fetch_sub(1, Ordering::SeqCst);
                }
            }
        });
    }

    fn publish(&self, key: TaskKey, status: TaskStatus) {
        if let Some(tx) = self.registry.lock().unwrap().get(&key) {
            tx.send_replace(status);
        }
    }

    /// Publish the terminal status and drop the task from the registry.
    fn finish(&self, key: TaskKey, status: TaskStatus) {
        if let Some(tx) = self.registry.lock().unwrap().remove(&key) {
            tx.send_replace(status);
        }
    }
}

/// Path of the artifact if it is already on disk.
fn materialized_path(record: &AssetRecord, kind: DownloadKind) -> Option<String> {
    let path = match kind {
        DownloadKind::File if record.is_downloaded() => record.local_file_path.as_ref(),
        DownloadKind::File => None,
        DownloadKind::Thumbnail => record.local_thumbnail_path.as_ref(),
    }?;
    Path::new(path).is_file().then(|| path.clone())
}
