//! Work distribution for chunk processing within a single file.
//!
//! The scheduler fans pending chunks out across async tasks with bounded
//! concurrency and tallies how the file ends up. Chunks already resolved by
//! earlier runs are counted straight into the report without being
//! rescheduled.

use crate::cancel::CancelToken;
use crate::pipeline::processor::{ChunkOutcome, ChunkProcessor};
use crate::pipeline::state::FileState;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;

/// Outcome tally for one file after a scheduling pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReport {
    /// Total chunks the file splits into
    pub total: usize,

    /// Chunks with annotated output, whether from this run or an earlier one
    pub succeeded: usize,

    /// Chunks permanently quarantined
    pub quarantined: usize,

    /// Chunks left pending (errors, or cancelled before being attempted)
    pub unresolved: usize,

    /// Unresolved chunks that failed with an infrastructure error this run
    pub errors: usize,
}

impl FileReport {
    /// Every chunk resolved and at least one succeeded.
    pub fn is_complete(&self) -> bool {
        self.succeeded > 0 && self.succeeded + self.quarantined == self.total
    }

    /// Every chunk resolved and all of them quarantined.
    pub fn is_all_invalid(&self) -> bool {
        self.total > 0 && self.quarantined == self.total
    }
}

impl std::fmt::Display for FileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Succeeded: {}, Quarantined: {}, Unresolved: {}, Errors: {}, Total: {}",
            self.succeeded, self.quarantined, self.unresolved, self.errors, self.total
        )
    }
}

/// Scheduler for distributing chunk processing across async tasks.
pub struct Scheduler {
    /// Chunk processor
    processor: Arc<ChunkProcessor>,

    /// Number of concurrent chunk processors
    concurrency: usize,

    /// Cooperative shutdown signal
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(processor: Arc<ChunkProcessor>, concurrency: usize, cancel: CancelToken) -> Self {
        Self { processor, concurrency, cancel }
    }

    /// Process every pending chunk of one file.
    ///
    /// Cancellation stops new chunks from being attempted, but chunks
    /// already in flight run to completion so no half-written artifact is
    /// abandoned; their results still count. Individual chunk errors are
    /// logged and leave the chunk pending for a later run.
    pub async fn run_file(&self, rel: &Path, state: &FileState) -> Result<FileReport> {
        let mut report = FileReport {
            total: state.total(),
            succeeded: state.succeeded(),
            quarantined: state.quarantined(),
            ..FileReport::default()
        };

        let pending = state.pending();
        if pending.is_empty() {
            return Ok(report);
        }

        tracing::info!(
            "Scheduling {} of {} chunks for {} ({} concurrent)",
            pending.len(),
            report.total,
            rel.display(),
            self.concurrency
        );

        let processor = self.processor.clone();
        let cancel = self.cancel.clone();
        let rel_buf = rel.to_path_buf();
        let results: Vec<(usize, Result<Option<ChunkOutcome>>)> = stream::iter(pending)
            .map(move |ordinal| {
                let processor = processor.clone();
                let cancel = cancel.clone();
                let rel = rel_buf.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (ordinal, Ok(None));
                    }
                    (ordinal, processor.process(&rel, ordinal).await.map(Some))
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (ordinal, result) in results {
            match result {
                Ok(Some(ChunkOutcome::Succeeded)) => report.succeeded += 1,
                Ok(Some(ChunkOutcome::Quarantined)) => report.quarantined += 1,
                // Not attempted, shutdown was already requested
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Chunk {} of {} failed: {:#}", ordinal, rel.display(), e);
                    report.errors += 1;
                }
            }
        }

        if self.cancel.is_cancelled() {
            tracing::debug!("Shutdown requested while scheduling {}", rel.display());
        }

        report.unresolved = report.total - report.succeeded - report.quarantined;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotator;
    use crate::annotate::testing::FakeAnnotator;
    use crate::corpus::Layout;
    use crate::pipeline::metrics::Metrics;
    use crate::pipeline::state::scan_work_dir;
    use std::time::Duration;

    fn setup(
        annotator: Arc<FakeAnnotator>,
        concurrency: usize,
    ) -> (tempfile::TempDir, Layout, Scheduler, CancelToken) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("src"), dir.path().join("dst"), "tok");
        let processor = Arc::new(ChunkProcessor::new(
            annotator as Arc<dyn Annotator>,
            layout.clone(),
            Metrics::new(),
        ));
        let cancel = CancelToken::new();
        let scheduler = Scheduler::new(processor, concurrency, cancel.clone());
        (dir, layout, scheduler, cancel)
    }

    fn write_chunks(layout: &Layout, rel: &Path, contents: &[&[u8]]) {
        std::fs::create_dir_all(layout.work_dir(rel)).unwrap();
        std::fs::write(layout.split_marker(rel), b"").unwrap();
        for (ordinal, content) in contents.iter().enumerate() {
            std::fs::write(layout.chunk_path(rel, ordinal), content).unwrap();
        }
    }

    #[tokio::test]
    async fn test_resolves_all_pending_chunks() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, scheduler, _cancel) = setup(fake.clone(), 2);
        let rel = Path::new("a.txt");
        write_chunks(&layout, rel, &[b"one\n", b"two\n", b"three\n"]);

        let state = scan_work_dir(&layout, rel).unwrap();
        let report = scheduler.run_file(rel, &state).await.unwrap();

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.unresolved, 0);
        assert!(report.is_complete());
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn test_counts_prior_progress_without_rescheduling() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, scheduler, _cancel) = setup(fake.clone(), 2);
        let rel = Path::new("a.txt");
        write_chunks(&layout, rel, &[b"one\n", b"two\n"]);
        std::fs::write(layout.part_path(rel, 0), b"ONE\n").unwrap();

        let state = scan_work_dir(&layout, rel).unwrap();
        let report = scheduler.run_file(rel, &state).await.unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_mixed_outcomes_tally() {
        let fake = Arc::new(FakeAnnotator::default().with_failure_on("bad"));
        let (_dir, layout, scheduler, _cancel) = setup(fake, 4);
        let rel = Path::new("a.txt");
        write_chunks(&layout, rel, &[b"good\n", b"bad\n", b"good\n"]);

        let state = scan_work_dir(&layout, rel).unwrap();
        let report = scheduler.run_file(rel, &state).await.unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.quarantined, 1);
        assert!(report.is_complete());
        assert!(!report.is_all_invalid());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let fake = Arc::new(FakeAnnotator::default().with_delay(Duration::from_millis(30)));
        let (_dir, layout, scheduler, _cancel) = setup(fake.clone(), 2);
        let rel = Path::new("a.txt");
        write_chunks(&layout, rel, &[b"a\n", b"b\n", b"c\n", b"d\n", b"e\n", b"f\n"]);

        let state = scan_work_dir(&layout, rel).unwrap();
        let report = scheduler.run_file(rel, &state).await.unwrap();

        assert_eq!(report.succeeded, 6);
        assert_eq!(fake.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_schedules_nothing() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, scheduler, cancel) = setup(fake.clone(), 2);
        let rel = Path::new("a.txt");
        write_chunks(&layout, rel, &[b"one\n", b"two\n"]);
        cancel.cancel();

        let state = scan_work_dir(&layout, rel).unwrap();
        let report = scheduler.run_file(rel, &state).await.unwrap();

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.unresolved, 2);
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_report_display() {
        let report = FileReport {
            total: 10,
            succeeded: 7,
            quarantined: 2,
            unresolved: 1,
            errors: 1,
        };
        let display = format!("{}", report);
        assert!(display.contains("Succeeded: 7"));
        assert!(display.contains("Quarantined: 2"));
        assert!(display.contains("Total: 10"));
    }
}
