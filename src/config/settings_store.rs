//! Live download settings, editable at runtime.

use super::DownloadSettings;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// A partial settings change. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_download_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_downloads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_retry_attempts: Option<u32>,
}

impl SettingsUpdate {
    fn validate(&self) -> Result<(), SettingsUpdateError> {
        if let Some(dir) = &self.download_dir {
            if dir.trim().is_empty() {
                return Err(SettingsUpdateError::Invalid(
                    "download_dir must not be empty".to_string(),
                ));
            }
        }
        let counts = [
            ("max_download_workers", self.max_download_workers),
            ("max_concurrent_downloads", self.max_concurrent_downloads),
            ("download_batch_size", self.download_batch_size),
            (
                "download_retry_attempts",
                self.download_retry_attempts.map(|n| n as usize),
            ),
        ];
        for (name, value) in counts {
            if value == Some(0) {
                return Err(SettingsUpdateError::Invalid(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }

    fn apply_to(&self, settings: &mut DownloadSettings) {
        if let Some(dir) = &self.download_dir {
            settings.download_dir = PathBuf::from(dir);
        }
        if let Some(n) = self.max_download_workers {
            settings.max_download_workers = n;
        }
        if let Some(n) = self.max_concurrent_downloads {
            settings.max_concurrent_downloads = n;
        }
        if let Some(n) = self.download_batch_size {
            settings.download_batch_size = n;
        }
        if let Some(n) = self.download_retry_attempts {
            settings.download_retry_attempts = n;
        }
    }

    /// Fold `newer` on top of `self`.
    fn merge(&mut self, newer: &SettingsUpdate) {
        if newer.download_dir.is_some() {
            self.download_dir = newer.download_dir.clone();
        }
        if newer.max_download_workers.is_some() {
            self.max_download_workers = newer.max_download_workers;
        }
        if newer.max_concurrent_downloads.is_some() {
            self.max_concurrent_downloads = newer.max_concurrent_downloads;
        }
        if newer.download_batch_size.is_some() {
            self.download_batch_size = newer.download_batch_size;
        }
        if newer.download_retry_attempts.is_some() {
            self.download_retry_attempts = newer.download_retry_attempts;
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsUpdateError {
    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("Failed to apply settings: {0:#}")]
    Storage(#[from] anyhow::Error),
}

struct SettingsState {
    current: DownloadSettings,
    /// Every change made at runtime, as written to the persistence file.
    overrides: SettingsUpdate,
}

/// Holder of the current [`DownloadSettings`].
///
/// Readers get a snapshot; a change only affects work scheduled after it.
pub struct SettingsStore {
    state: Mutex<SettingsState>,
    defaults: DownloadSettings,
    persist_path: Option<PathBuf>,
}

impl SettingsStore {
    /// Create a store seeded with `initial`, applying any overrides previously
    /// persisted at `persist_path`.
    pub fn new(initial: DownloadSettings, persist_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut current = initial;
        let mut overrides = SettingsUpdate::default();

        if let Some(path) = persist_path.as_deref() {
            if path.exists() {
                let persisted = load_overrides(path)?;
                match persisted.validate() {
                    Ok(()) => {
                        persisted.apply_to(&mut current);
                        overrides = persisted;
                        info!("Loaded settings overrides from {:?}", path);
                    }
                    Err(e) => warn!("Ignoring persisted settings at {:?}: {}", path, e),
                }
            }
        }

        current
            .ensure_dirs()
            .with_context(|| format!("Failed to create download dir {:?}", current.download_dir))?;

        Ok(Self {
            state: Mutex::new(SettingsState { current, overrides }),
            defaults: DownloadSettings::default(),
            persist_path,
        })
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> DownloadSettings {
        self.state.lock().unwrap().current.clone()
    }

    /// Built-in defaults, regardless of config or runtime changes.
    pub fn defaults(&self) -> DownloadSettings {
        self.defaults.clone()
    }

    /// Validate and apply a partial update. Returns the resulting settings.
    pub fn update(&self, update: SettingsUpdate) -> Result<DownloadSettings, SettingsUpdateError> {
        update.validate()?;

        let mut state = self.state.lock().unwrap();
        let mut next = state.current.clone();
        update.apply_to(&mut next);

        if next.download_dir != state.current.download_dir {
            next.ensure_dirs().with_context(|| {
                format!("Failed to create download dir {:?}", next.download_dir)
            })?;
        }

        let mut overrides = state.overrides.clone();
        overrides.merge(&update);
        if let Some(path) = self.persist_path.as_deref() {
            save_overrides(path, &overrides)?;
        }

        info!(
            "Settings updated: dir={:?} workers={} concurrent={} batch={} retries={}",
            next.download_dir,
            next.max_download_workers,
            next.max_concurrent_downloads,
            next.download_batch_size,
            next.download_retry_attempts
        );

        state.current = next.clone();
        state.overrides = overrides;
        Ok(next)
    }
}

fn load_overrides(path: &Path) -> anyhow::Result<SettingsUpdate> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse settings file: {:?}", path))
}

fn save_overrides(path: &Path, overrides: &SettingsUpdate) -> anyhow::Result<()> {
    let content = toml::to_string(overrides).context("Failed to serialize settings")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write settings file: {:?}", path))
}
