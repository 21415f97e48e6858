use std::collections::HashSet;

use super::{SyncError, Syncer};
use crate::sync::file::FileEntry;

#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    /// Leave static assets and deletes draining in the background instead of waiting for them.
    pub delay_low_priority_files: bool,
    /// Delete remote files that no longer exist locally.
    pub delete: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            delay_low_priority_files: true,
            delete: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    /// Remove local files that no longer exist remotely.
    pub delete: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self { delete: true }
    }
}

impl Syncer {
    pub async fn upload_theme(&self, options: UploadOptions) -> Result<(), SyncError> {
        self.upload_theme_with_progress(options, |_, _| {}).await
    }

    /// Full upload pass. Liquid and JSON files are rendered by the store, so they must be
    /// current before anything else is scheduled; static assets and deletes follow without a
    /// barrier unless `delay_low_priority_files` is off.
    pub async fn upload_theme_with_progress<F>(
        &self,
        options: UploadOptions,
        mut progress: F,
    ) -> Result<(), SyncError>
    where
        F: FnMut(usize, usize),
    {
        self.fetch_checksums().await?;

        let project = self.project();
        let liquid = project.liquid_files()?;
        let json = project.json_files()?;
        let assets = project.asset_files()?;

        let local: HashSet<&str> = liquid
            .iter()
            .chain(&json)
            .chain(&assets)
            .map(FileEntry::relative_path)
            .collect();
        let removed: Vec<FileEntry> = self
            .checksums()
            .keys()
            .into_iter()
            .filter(|key| !local.contains(key.as_str()))
            .filter_map(|key| self.remote_file(&key))
            .collect();

        let critical = self
            .enqueue_updates(liquid.iter().chain(&json).cloned())
            .await;
        tracing::info!(queued = critical, "uploading liquid and json files");
        self.wait_with_progress(&mut progress).await?;

        let background = self.enqueue_updates(assets).await;
        tracing::info!(queued = background, "uploading assets");

        if options.delete {
            let deletes = self.enqueue_deletes(removed).await;
            tracing::info!(queued = deletes, "deleting remote files missing locally");
        }

        if !options.delay_low_priority_files {
            self.wait_with_progress(&mut progress).await?;
        }
        Ok(())
    }

    pub async fn download_theme(&self, options: DownloadOptions) -> Result<(), SyncError> {
        self.download_theme_with_progress(options, |_, _| {}).await
    }

    /// Full download pass: every remote file whose checksum differs from the local copy is
    /// fetched, and local files absent remotely are removed when `delete` is set.
    pub async fn download_theme_with_progress<F>(
        &self,
        options: DownloadOptions,
        progress: F,
    ) -> Result<(), SyncError>
    where
        F: FnMut(usize, usize),
    {
        self.fetch_checksums().await?;
        let project = self.project();

        if options.delete {
            for file in project.all_files()? {
                if self.checksums().contains(&file) || project.is_ignored(&file) {
                    continue;
                }
                match file.remove().await {
                    Ok(()) => tracing::debug!(key = file.relative_path(), "removed local file"),
                    Err(err) => self.reporter().report(format!("remove {file}: {err}")),
                }
            }
        }

        let remote: Vec<FileEntry> = self
            .checksums()
            .keys()
            .iter()
            .filter_map(|key| self.remote_file(key))
            .collect();
        let queued = self.enqueue_gets(remote).await;
        tracing::info!(queued, "downloading theme files");
        self.wait_with_progress(progress).await
    }

    /// Local entry for a key from the remote listing. Keys resolving outside the root are
    /// reported and skipped.
    fn remote_file(&self, key: &str) -> Option<FileEntry> {
        let file = self.project().file(key);
        if file.is_none() {
            self.reporter()
                .report(format!("{key}: asset key resolves outside the theme root, skipped"));
        }
        file
    }
}
