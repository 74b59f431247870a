//! Local layout and atomic writes of downloaded artifacts.

use super::DownloadKind;
use crate::catalog_store::AssetRecord;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const KNOBS_SUBDIR: &str = "knobs";
const THUMBNAILS_SUBDIR: &str = "thumbnails";

/// Final path of an artifact under `download_dir`. Names depend only on the
/// asset id (and, for knob files, the published file name).
pub fn target_path(download_dir: &Path, kind: DownloadKind, record: &AssetRecord) -> PathBuf {
    match kind {
        DownloadKind::File => download_dir.join(KNOBS_SUBDIR).join(format!(
            "{}_{}",
            record.id,
            sanitize_file_name(&record.source_file_name)
        )),
        DownloadKind::Thumbnail => download_dir
            .join(THUMBNAILS_SUBDIR)
            .join(format!("{}.png", record.id)),
    }
}

/// Make a gallery file name safe to use as a single path component.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "knob".to_string()
    } else {
        trimmed.to_string()
    }
}

fn staging_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}

/// A file written next to its destination and renamed into place on commit.
///
/// Until `commit` succeeds nothing exists at the final path. Dropping an
/// uncommitted file removes the staging file.
pub struct StagedFile {
    final_path: PathBuf,
    staging_path: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn new(final_path: PathBuf) -> Self {
        let staging_path = staging_path(&final_path);
        Self {
            final_path,
            staging_path,
            committed: false,
        }
    }

    /// Write the complete contents to the staging file and flush them to disk.
    pub async fn write_all(&self, contents: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.staging_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&self.staging_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Atomically move the staging file to the final path.
    pub async fn commit(mut self) -> std::io::Result<PathBuf> {
        tokio::fs::rename(&self.staging_path, &self.final_path).await?;
        self.committed = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.staging_path);
        }
    }
}

/// Write `contents` to `final_path` through a staging file.
pub async fn write_atomically(final_path: PathBuf, contents: &[u8]) -> std::io::Result<PathBuf> {
    let staged = StagedFile::new(final_path);
    staged.write_all(contents).await?;
    staged.commit().await
}
