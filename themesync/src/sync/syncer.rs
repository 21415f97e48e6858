use std::error::Error as _;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::join_all;
use theme_core::{AssetUpload, RateLimit, ThemeClient, ThemeError};
use thiserror::Error;
use tokio::task::JoinHandle;

use super::backoff::BackoffController;
use super::checksums::ChecksumRegistry;
use super::file::{FileEntry, checksum_of};
use super::queue::{Operation, OperationKind, OperationQueue, PendingSet};
use super::report::{ErrorReporter, format_api_error};
use crate::project::{ProjectError, ThemeProject};

#[path = "syncer_passes.rs"]
mod passes;

pub use passes::{DownloadOptions, UploadOptions};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("theme api error: {0}")]
    Theme(#[from] ThemeError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("project error: {0}")]
    Project(#[from] ProjectError),
    #[error("no workers started; call start() before waiting")]
    NoWorkers,
}

/// Uploads, deletes and downloads theme files through a fixed pool of worker tasks.
pub struct Syncer {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    client: ThemeClient,
    project: ThemeProject,
    checksums: ChecksumRegistry,
    queue: OperationQueue,
    pending: PendingSet,
    backoff: BackoffController,
    reporter: ErrorReporter,
    worker_count: AtomicUsize,
    verbose: bool,
}

impl Syncer {
    pub fn new(client: ThemeClient, project: ThemeProject) -> Self {
        Self::with_parts(
            client,
            project,
            BackoffController::default(),
            ErrorReporter::new(),
            false,
        )
    }

    pub fn with_parts(
        client: ThemeClient,
        project: ThemeProject,
        backoff: BackoffController,
        reporter: ErrorReporter,
        verbose: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                project,
                checksums: ChecksumRegistry::new(),
                queue: OperationQueue::new(),
                pending: PendingSet::new(),
                backoff,
                reporter,
                worker_count: AtomicUsize::new(0),
                verbose,
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn project(&self) -> &ThemeProject {
        &self.shared.project
    }

    pub fn checksums(&self) -> &ChecksumRegistry {
        &self.shared.checksums
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.shared.reporter
    }

    pub fn backoff(&self) -> &BackoffController {
        &self.shared.backoff
    }

    /// Spawns `count` workers (at least one) draining the shared queue.
    pub fn start(&self, count: usize) {
        let count = count.max(1);
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for _ in 0..count {
            let worker_id = self.shared.worker_count.fetch_add(1, Ordering::SeqCst);
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(shared.run_worker(worker_id)));
        }
        tracing::debug!(count, "workers started");
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count.load(Ordering::SeqCst)
    }

    /// Closes the queue and waits for every worker to exit. Operations already running finish;
    /// queued ones are dropped without being performed.
    pub async fn shutdown(&self) {
        self.shared.queue.close();
        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for result in join_all(handles).await {
            if let Err(err) = result {
                tracing::warn!(%err, "worker task failed");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    pub fn size(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.pending.is_empty()
    }

    pub fn is_pending(&self, kind: OperationKind, file: &FileEntry) -> bool {
        self.shared
            .pending
            .contains(&Operation::new(kind, file.clone()))
    }

    /// Schedules an operation unless it is already pending, ignored, or a no-op. Returns
    /// whether it was accepted.
    pub async fn enqueue(&self, kind: OperationKind, file: FileEntry) -> bool {
        let op = Operation::new(kind, file);
        let shared = &self.shared;
        if shared.pending.contains(&op) {
            return false;
        }
        if shared.project.is_ignored(&op.file) {
            tracing::debug!(key = op.file.relative_path(), "ignoring {}", op.kind.as_str());
            return false;
        }
        if shared.is_up_to_date(&op).await {
            tracing::debug!(
                key = op.file.relative_path(),
                "skipping {}, checksum matches",
                op.kind.as_str()
            );
            return false;
        }
        if !shared.pending.insert(op.clone()) {
            return false;
        }
        if !shared.queue.push(op.clone()) {
            shared.pending.remove(&op);
            return false;
        }
        true
    }

    pub async fn enqueue_updates(&self, files: impl IntoIterator<Item = FileEntry>) -> usize {
        self.enqueue_all(OperationKind::Update, files).await
    }

    pub async fn enqueue_deletes(&self, files: impl IntoIterator<Item = FileEntry>) -> usize {
        self.enqueue_all(OperationKind::Delete, files).await
    }

    pub async fn enqueue_gets(&self, files: impl IntoIterator<Item = FileEntry>) -> usize {
        self.enqueue_all(OperationKind::Get, files).await
    }

    async fn enqueue_all(
        &self,
        kind: OperationKind,
        files: impl IntoIterator<Item = FileEntry>,
    ) -> usize {
        let mut accepted = 0;
        for file in files {
            if self.enqueue(kind, file).await {
                accepted += 1;
            }
        }
        accepted
    }

    /// Replaces the checksum map with the remote listing.
    pub async fn fetch_checksums(&self) -> Result<(), SyncError> {
        let response = self.shared.client.list_assets().await?;
        self.shared.checksums.replace(&response.body);
        tracing::debug!(assets = self.shared.checksums.len(), "fetched remote checksums");
        Ok(())
    }

    pub async fn wait(&self) -> Result<(), SyncError> {
        self.wait_with_progress(|_, _| {}).await
    }

    /// Resolves once nothing is pending or the queue is closed. `progress` receives
    /// `(pending, pending_at_start)` whenever the pending count changes.
    pub async fn wait_with_progress<F>(&self, mut progress: F) -> Result<(), SyncError>
    where
        F: FnMut(usize, usize),
    {
        if self.worker_count() == 0 {
            return Err(SyncError::NoWorkers);
        }
        let mut sizes = self.shared.pending.subscribe();
        let mut closed = self.shared.queue.subscribe_closed();
        let total = *sizes.borrow_and_update();
        let mut last = total;
        loop {
            let current = *sizes.borrow_and_update();
            if current != last {
                progress(current, total);
                last = current;
            }
            if current == 0 || *closed.borrow() {
                return Ok(());
            }
            tokio::select! {
                changed = sizes.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                _ = closed.changed() => {}
            }
        }
    }
}

impl Drop for Syncer {
    /// Workers exit once the queue is closed, even without an explicit `shutdown`.
    fn drop(&mut self) {
        self.shared.queue.close();
    }
}

impl Shared {
    async fn run_worker(self: Arc<Self>, worker_id: usize) {
        while let Some(op) = self.queue.pop().await {
            match AssertUnwindSafe(self.perform(&op)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.reporter.report(self.describe_failure(&op, &err)),
                Err(_) => self.reporter.report(format!("{op}: operation panicked")),
            }
            self.pending.remove(&op);
        }
        tracing::debug!(worker_id, "worker stopped");
    }

    async fn is_up_to_date(&self, op: &Operation) -> bool {
        if op.kind == OperationKind::Delete {
            return false;
        }
        if op.kind == OperationKind::Get && !op.file.exists().await {
            return false;
        }
        let Some(remote) = self.checksums.get(op.file.relative_path()) else {
            return false;
        };
        match op.file.checksum().await {
            Ok(local) => local == remote,
            Err(err) => {
                tracing::debug!(
                    key = op.file.relative_path(),
                    %err,
                    "unable to compute checksum"
                );
                false
            }
        }
    }

    async fn perform(&self, op: &Operation) -> Result<(), SyncError> {
        if self.queue.is_closed() {
            return Ok(());
        }
        self.backoff.wait().await;
        if self.queue.is_closed() {
            return Ok(());
        }

        let result = match op.kind {
            OperationKind::Update => self.update(&op.file).await,
            OperationKind::Delete => self.delete(&op.file).await,
            OperationKind::Get => self.get(&op.file).await,
        };
        match result {
            Ok(rate_limit) => {
                tracing::debug!(%op, "done");
                self.observe_rate_limit(rate_limit).await;
                Ok(())
            }
            Err(SyncError::Theme(err @ ThemeError::Api { .. })) => {
                self.reporter
                    .report(format!("{op}: {}", format_api_error(&err)));
                if err.is_rate_limited() && !self.backoff.is_backing_off() {
                    self.backoff.trigger().await;
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn update(&self, file: &FileEntry) -> Result<Option<RateLimit>, SyncError> {
        let content = file.read().await?;
        let key = file.relative_path();
        let upload = if file.is_text() {
            match String::from_utf8(content) {
                Ok(text) => AssetUpload::text(key, text),
                Err(err) => AssetUpload::binary(key, err.as_bytes()),
            }
        } else {
            AssetUpload::binary(key, &content)
        };
        let response = self.client.update_asset(&upload).await?;
        self.checksums.update([&response.body]);
        Ok(response.rate_limit)
    }

    async fn delete(&self, file: &FileEntry) -> Result<Option<RateLimit>, SyncError> {
        let response = self.client.delete_asset(file.relative_path()).await?;
        self.checksums.remove(file.relative_path());
        Ok(response.rate_limit)
    }

    async fn get(&self, file: &FileEntry) -> Result<Option<RateLimit>, SyncError> {
        let response = self.client.get_asset(file.relative_path()).await?;
        let content = response.body.content()?;
        file.write(&content).await?;
        let checksum = response
            .body
            .checksum
            .clone()
            .unwrap_or_else(|| checksum_of(&content, file.is_json()));
        self.checksums.insert(file.relative_path(), checksum);
        Ok(response.rate_limit)
    }

    /// Pauses every worker when fewer calls remain than there are workers that could issue
    /// one concurrently.
    async fn observe_rate_limit(&self, rate_limit: Option<RateLimit>) {
        let Some(rate_limit) = rate_limit else {
            return;
        };
        let reserve = self.worker_count.load(Ordering::SeqCst) as u32;
        if !self.backoff.is_backing_off() && rate_limit.is_near_limit(reserve) {
            tracing::debug!(%rate_limit, "rate limit nearly exhausted");
            self.backoff.trigger().await;
        }
    }

    fn describe_failure(&self, op: &Operation, err: &SyncError) -> String {
        let mut message = format!("{op}: {err}");
        if self.verbose {
            let mut source = err.source();
            while let Some(cause) = source {
                message.push_str(&format!("\n  caused by: {cause}"));
                source = cause.source();
            }
        }
        message
    }
}

#[cfg(test)]
#[path = "syncer_tests.rs"]
mod tests;
