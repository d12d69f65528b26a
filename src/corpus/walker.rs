//! Corpus traversal and per-file orchestration.
//!
//! The walker owns the outer loop of a run: discover input files, decide
//! per file whether anything is left to do, and drive split, scheduling and
//! reassembly for the files that need work. Files are processed one at a
//! time; parallelism lives at the chunk level.

use crate::cancel::CancelToken;
use crate::corpus::layout::Layout;
use crate::pipeline::{
    FileDisposition, Metrics, MetricsReporter, Reassembler, Scheduler, ensure_split,
    inspect_work_dir, scan_work_dir, sweep_tmp_files,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Configuration for the corpus walker.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Lines per chunk when splitting source files
    pub chunk_lines: usize,

    /// Extension of input files to pick up, without the dot
    pub input_ext: String,

    /// Enable progress reporting
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    pub metrics_interval_secs: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            chunk_lines: 5000,
            input_ext: "txt".to_string(),
            enable_metrics: true,
            metrics_interval_secs: 10,
        }
    }
}

/// Walks the corpus and processes every input file in turn.
pub struct CorpusWalker {
    /// Corpus path scheme
    layout: Layout,

    /// Chunk scheduler
    scheduler: Scheduler,

    /// Output reassembler
    reassembler: Reassembler,

    /// Metrics
    metrics: Arc<Metrics>,

    /// Cooperative shutdown signal
    cancel: CancelToken,

    /// Configuration
    config: WalkerConfig,
}

impl CorpusWalker {
    pub fn new(
        layout: Layout,
        scheduler: Scheduler,
        reassembler: Reassembler,
        metrics: Arc<Metrics>,
        cancel: CancelToken,
        config: WalkerConfig,
    ) -> Self {
        Self {
            layout,
            scheduler,
            reassembler,
            metrics,
            cancel,
            config,
        }
    }

    /// Enumerate input files under the source root, as paths relative to it,
    /// in sorted order.
    pub async fn discover(&self) -> Result<Vec<PathBuf>> {
        let root = self.layout.src_root().to_path_buf();
        let ext = self.config.input_ext.clone();
        tokio::task::spawn_blocking(move || discover_sync(&root, &ext))
            .await
            .context("Discovery task panicked")?
    }

    /// Process the whole corpus once.
    ///
    /// Files already concluded by earlier runs are skipped. Cancellation
    /// stops the walk between files and between chunks; whatever resolved
    /// before the stop is kept for the next run.
    pub async fn run(&self) -> Result<RunSummary> {
        let files = self.discover().await?;
        let mut summary = RunSummary {
            files_total: files.len(),
            ..RunSummary::default()
        };

        tracing::info!(
            "Discovered {} input files under {}",
            files.len(),
            self.layout.src_root().display()
        );

        // Start metrics reporter if enabled
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let reporter_handle = if self.config.enable_metrics {
            let reporter = MetricsReporter::new(
                self.metrics.clone(),
                self.config.metrics_interval_secs,
                files.len() as u64,
            );
            Some(tokio::spawn(reporter.run(shutdown_rx)))
        } else {
            drop(shutdown_rx);
            None
        };

        for rel in &files {
            if self.cancel.is_cancelled() {
                tracing::info!("Shutdown requested, stopping corpus walk");
                break;
            }
            match self.process_file(rel).await {
                Ok(FileDisposition::Completed) => summary.files_completed += 1,
                Ok(FileDisposition::Skipped) => summary.files_skipped += 1,
                Ok(FileDisposition::AllInvalid) => summary.files_all_invalid += 1,
                Ok(FileDisposition::Incomplete) => summary.files_incomplete += 1,
                Err(e) => {
                    // A file-level failure leaves its work directory for a
                    // later run and does not stop the walk.
                    tracing::error!("Failed to process {}: {:#}", rel.display(), e);
                    summary.files_incomplete += 1;
                    self.metrics.add_file_incomplete();
                }
            }
        }

        summary.interrupted = self.cancel.is_cancelled();

        // Shutdown metrics reporter
        let _ = shutdown_tx.send(()).await;
        if let Some(handle) = reporter_handle {
            let _ = handle.await;
        }

        if self.config.enable_metrics {
            let reporter = MetricsReporter::new(
                self.metrics.clone(),
                self.config.metrics_interval_secs,
                files.len() as u64,
            );
            reporter.print_summary();
        }

        Ok(summary)
    }

    /// Drive one file through split, scheduling and reassembly.
    async fn process_file(&self, rel: &Path) -> Result<FileDisposition> {
        let output = self.layout.output_path(rel);
        if tokio::fs::try_exists(&output)
            .await
            .with_context(|| format!("Failed to stat {}", output.display()))?
        {
            // A crash between output rename and work directory removal
            // leaves the directory behind; the output already being
            // published makes it safe to drop now.
            let work_dir = self.layout.work_dir(rel);
            if tokio::fs::try_exists(&work_dir)
                .await
                .with_context(|| format!("Failed to stat {}", work_dir.display()))?
            {
                tracing::info!(
                    "Removing leftover work directory of completed {}",
                    rel.display()
                );
                tokio::fs::remove_dir_all(&work_dir)
                    .await
                    .with_context(|| format!("Failed to remove {}", work_dir.display()))?;
            }
            tracing::debug!("Skipping {}, output already exists", rel.display());
            self.metrics.add_file_skipped();
            return Ok(FileDisposition::Skipped);
        }

        if self.check_all_invalid_verdict(rel).await? {
            tracing::debug!(
                "Skipping {}, a prior run quarantined every chunk",
                rel.display()
            );
            self.metrics.add_file_skipped();
            return Ok(FileDisposition::Skipped);
        }

        ensure_split(&self.layout, rel, self.config.chunk_lines).await?;

        let layout = self.layout.clone();
        let rel_buf = rel.to_path_buf();
        let state = tokio::task::spawn_blocking(move || scan_work_dir(&layout, &rel_buf))
            .await
            .context("Work directory scan panicked")??;

        let prior = state.succeeded() + state.quarantined();
        if prior > 0 {
            tracing::info!(
                "Resuming {} with {} of {} chunks already resolved",
                rel.display(),
                prior,
                state.total()
            );
            self.metrics.add_chunks_reused(prior as u64);
        }

        let report = self.scheduler.run_file(rel, &state).await?;

        if self.cancel.is_cancelled() {
            self.sweep_after_interrupt(rel).await;
        }

        let disposition = self.reassembler.finish_file(rel, &report).await?;
        match disposition {
            FileDisposition::Completed => self.metrics.add_file_completed(),
            FileDisposition::AllInvalid => self.metrics.add_file_all_invalid(),
            FileDisposition::Incomplete => self.metrics.add_file_incomplete(),
            FileDisposition::Skipped => self.metrics.add_file_skipped(),
        }
        Ok(disposition)
    }

    /// The permanent no-output verdict: a quarantine store exists, the work
    /// directory is gone, and no output was written.
    async fn check_all_invalid_verdict(&self, rel: &Path) -> Result<bool> {
        let layout = self.layout.clone();
        let rel_buf = rel.to_path_buf();
        tokio::task::spawn_blocking(move || all_invalid_verdict_sync(&layout, &rel_buf))
            .await
            .context("Verdict check panicked")?
    }

    /// Best-effort removal of staging files after a cancelled pass.
    async fn sweep_after_interrupt(&self, rel: &Path) {
        let layout = self.layout.clone();
        let rel_buf = rel.to_path_buf();
        let swept =
            tokio::task::spawn_blocking(move || sweep_tmp_files(&layout, &rel_buf)).await;
        match swept {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    "Failed to sweep temporary files of {}: {:#}",
                    rel.display(),
                    e
                );
            }
            Err(e) => tracing::warn!("Sweep task panicked: {}", e),
        }
    }
}

fn discover_sync(root: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden_dir(e))
    {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("Failed to relativize {}", entry.path().display()))?;
        files.push(rel.to_path_buf());
    }
    files.sort();
    Ok(files)
}

/// Dot-directories hold pipeline bookkeeping, never corpus input.
fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'))
}

fn all_invalid_verdict_sync(layout: &Layout, rel: &Path) -> Result<bool> {
    let work_dir = layout.work_dir(rel);
    if work_dir
        .try_exists()
        .with_context(|| format!("Failed to stat {}", work_dir.display()))?
    {
        return Ok(false);
    }
    let invalid_dir = layout.invalid_dir(rel);
    match std::fs::read_dir(&invalid_dir) {
        Ok(mut entries) => Ok(entries.next().transpose()?.is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to list {}", invalid_dir.display()))
        }
    }
}

/// Per-verdict file counts from one walk of the corpus.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    /// Input files discovered
    pub files_total: usize,

    /// Files whose output was written this run
    pub files_completed: usize,

    /// Files already concluded by an earlier run
    pub files_skipped: usize,

    /// Files that ended all-invalid this run
    pub files_all_invalid: usize,

    /// Files with unresolved chunks remaining
    pub files_incomplete: usize,

    /// Whether the run stopped early on a shutdown signal
    pub interrupted: bool,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Completed: {}, Skipped: {}, All-invalid: {}, Incomplete: {}, Total files: {}",
            self.files_completed,
            self.files_skipped,
            self.files_all_invalid,
            self.files_incomplete,
            self.files_total
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Corpus-wide progress figures for status reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorpusStatus {
    pub files_total: usize,
    pub files_completed: usize,
    pub files_all_invalid: usize,
    pub files_in_progress: usize,
    pub files_unstarted: usize,
    pub chunks_succeeded: usize,
    pub chunks_quarantined: usize,
    pub chunks_pending: usize,
}

/// Inspect a corpus without touching it.
///
/// Reports how far processing has come: which files are done, which carry
/// partial work, and how many chunks inside the partial ones are already
/// resolved.
pub async fn corpus_status(layout: &Layout, input_ext: &str) -> Result<CorpusStatus> {
    let layout = layout.clone();
    let ext = input_ext.to_string();
    tokio::task::spawn_blocking(move || corpus_status_sync(&layout, &ext))
        .await
        .context("Status scan panicked")?
}

fn corpus_status_sync(layout: &Layout, ext: &str) -> Result<CorpusStatus> {
    let files = discover_sync(layout.src_root(), ext)?;
    let mut status = CorpusStatus {
        files_total: files.len(),
        ..CorpusStatus::default()
    };

    for rel in &files {
        if layout.output_path(rel).try_exists()? {
            status.files_completed += 1;
            continue;
        }
        if layout.work_dir(rel).try_exists()? {
            status.files_in_progress += 1;
            let state = inspect_work_dir(layout, rel)?;
            status.chunks_succeeded += state.succeeded();
            status.chunks_quarantined += state.quarantined();
            status.chunks_pending += state.pending().len();
            continue;
        }
        if all_invalid_verdict_sync(layout, rel)? {
            status.files_all_invalid += 1;
            continue;
        }
        status.files_unstarted += 1;
    }

    Ok(status)
}
