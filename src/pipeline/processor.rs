//! Resolve a single chunk: annotate it, or quarantine it permanently.

use crate::annotate::Annotator;
use crate::corpus::layout::{self, Layout};
use crate::pipeline::metrics::Metrics;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Terminal resolution of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Succeeded,
    Quarantined,
}

/// Runs the annotator over one chunk input and records the result on disk.
///
/// A chunk that already carries a part file or a quarantine marker is never
/// reprocessed. Annotator failures and empty annotator output quarantine the
/// chunk for good; only infrastructure errors (unreadable input, failed
/// writes) propagate as errors so the chunk stays pending for a later run.
pub struct ChunkProcessor {
    annotator: Arc<dyn Annotator>,
    layout: Layout,
    metrics: Arc<Metrics>,
}

impl ChunkProcessor {
    pub fn new(annotator: Arc<dyn Annotator>, layout: Layout, metrics: Arc<Metrics>) -> Self {
        Self { annotator, layout, metrics }
    }

    pub async fn process(&self, rel: &Path, ordinal: usize) -> Result<ChunkOutcome> {
        let part = self.layout.part_path(rel, ordinal);
        if tokio::fs::try_exists(&part)
            .await
            .with_context(|| format!("Failed to stat {}", part.display()))?
        {
            self.metrics.add_chunks_reused(1);
            return Ok(ChunkOutcome::Succeeded);
        }

        let marker = self.layout.invalid_marker_path(rel, ordinal);
        if tokio::fs::try_exists(&marker)
            .await
            .with_context(|| format!("Failed to stat {}", marker.display()))?
        {
            self.metrics.add_chunks_reused(1);
            return Ok(ChunkOutcome::Quarantined);
        }

        let input_path = self.layout.chunk_path(rel, ordinal);
        let input = tokio::fs::read(&input_path)
            .await
            .with_context(|| format!("Failed to read chunk input {}", input_path.display()))?;
        self.metrics.add_bytes_read(input.len() as u64);

        // Nothing for the annotator to do with zero bytes. Resolve the chunk
        // directly so empty sources still complete.
        if input.is_empty() {
            self.write_part(rel, ordinal, &[]).await?;
            self.metrics.add_chunk_annotated();
            return Ok(ChunkOutcome::Succeeded);
        }

        match self.annotator.annotate(&input).await {
            Ok(output) if !output.is_empty() => {
                self.write_part(rel, ordinal, &output).await?;
                self.metrics.add_bytes_written(output.len() as u64);
                self.metrics.add_chunk_annotated();
                Ok(ChunkOutcome::Succeeded)
            }
            Ok(_) => {
                self.quarantine(rel, ordinal, "annotator produced no output").await?;
                Ok(ChunkOutcome::Quarantined)
            }
            Err(e) => {
                self.quarantine(rel, ordinal, &format!("{e:#}")).await?;
                Ok(ChunkOutcome::Quarantined)
            }
        }
    }

    /// Publish annotated output via a temporary file and an atomic rename,
    /// so a part file is only ever observed whole.
    async fn write_part(&self, rel: &Path, ordinal: usize, data: &[u8]) -> Result<()> {
        let part = self.layout.part_path(rel, ordinal);
        let tmp = layout::tmp_path(&part);
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &part)
            .await
            .with_context(|| format!("Failed to publish {}", part.display()))?;
        Ok(())
    }

    /// Mark the chunk invalid and move its input to the quarantine store.
    ///
    /// The marker is written before the input moves. If the move is
    /// interrupted, the marker already makes the chunk terminal, instead of
    /// leaving a pending chunk whose input has vanished.
    async fn quarantine(&self, rel: &Path, ordinal: usize, reason: &str) -> Result<()> {
        tracing::warn!("Quarantining chunk {} of {}: {}", ordinal, rel.display(), reason);

        let marker = self.layout.invalid_marker_path(rel, ordinal);
        tokio::fs::write(&marker, reason.as_bytes())
            .await
            .with_context(|| format!("Failed to write quarantine marker {}", marker.display()))?;

        let invalid_dir = self.layout.invalid_dir(rel);
        tokio::fs::create_dir_all(&invalid_dir)
            .await
            .with_context(|| format!("Failed to create {}", invalid_dir.display()))?;

        let input = self.layout.chunk_path(rel, ordinal);
        let preserved = invalid_dir.join(self.layout.chunk_file_name(ordinal));
        tokio::fs::rename(&input, &preserved)
            .await
            .with_context(|| format!("Failed to move {} to quarantine", input.display()))?;

        self.metrics.add_chunk_quarantined();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::testing::FakeAnnotator;

    fn setup(annotator: Arc<FakeAnnotator>) -> (tempfile::TempDir, Layout, ChunkProcessor) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("src"), dir.path().join("dst"), "tok");
        let processor =
            ChunkProcessor::new(annotator as Arc<dyn Annotator>, layout.clone(), Metrics::new());
        (dir, layout, processor)
    }

    fn write_chunk(layout: &Layout, rel: &Path, ordinal: usize, content: &[u8]) {
        std::fs::create_dir_all(layout.work_dir(rel)).unwrap();
        std::fs::write(layout.chunk_path(rel, ordinal), content).unwrap();
    }

    #[tokio::test]
    async fn test_annotates_fresh_chunk() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, processor) = setup(fake.clone());
        let rel = Path::new("a.txt");
        write_chunk(&layout, rel, 0, b"hello\n");

        let outcome = processor.process(rel, 0).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Succeeded);
        assert_eq!(fake.calls(), 1);
        assert_eq!(std::fs::read(layout.part_path(rel, 0)).unwrap(), b"HELLO\n");
        // The temporary staging file must not survive the publish.
        assert!(!layout::tmp_path(&layout.part_path(rel, 0)).exists());
    }

    #[tokio::test]
    async fn test_existing_part_short_circuits() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, processor) = setup(fake.clone());
        let rel = Path::new("a.txt");
        write_chunk(&layout, rel, 0, b"hello\n");
        std::fs::write(layout.part_path(rel, 0), b"FROM EARLIER RUN\n").unwrap();

        let outcome = processor.process(rel, 0).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Succeeded);
        assert_eq!(fake.calls(), 0);
        assert_eq!(std::fs::read(layout.part_path(rel, 0)).unwrap(), b"FROM EARLIER RUN\n");
    }

    #[tokio::test]
    async fn test_existing_marker_short_circuits() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, processor) = setup(fake.clone());
        let rel = Path::new("a.txt");
        std::fs::create_dir_all(layout.work_dir(rel)).unwrap();
        std::fs::write(layout.invalid_marker_path(rel, 3), b"bad").unwrap();

        let outcome = processor.process(rel, 3).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Quarantined);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_succeeds_without_annotator() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, processor) = setup(fake.clone());
        let rel = Path::new("a.txt");
        write_chunk(&layout, rel, 0, b"");

        let outcome = processor.process(rel, 0).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Succeeded);
        assert_eq!(fake.calls(), 0);
        assert_eq!(std::fs::read(layout.part_path(rel, 0)).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_annotator_failure_quarantines() {
        let fake = Arc::new(FakeAnnotator::default().with_failure_on("poison"));
        let (_dir, layout, processor) = setup(fake);
        let rel = Path::new("a.txt");
        write_chunk(&layout, rel, 1, b"poison pill\n");

        let outcome = processor.process(rel, 1).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Quarantined);

        let marker = layout.invalid_marker_path(rel, 1);
        assert!(marker.exists());
        let reason = std::fs::read_to_string(&marker).unwrap();
        assert!(reason.contains("rejected"));

        // Input preserved in the quarantine store, gone from the work dir.
        assert!(!layout.chunk_path(rel, 1).exists());
        let preserved = layout.invalid_dir(rel).join(layout.chunk_file_name(1));
        assert_eq!(std::fs::read(preserved).unwrap(), b"poison pill\n");
        assert!(!layout.part_path(rel, 1).exists());
    }

    #[tokio::test]
    async fn test_empty_annotator_output_quarantines() {
        let fake = Arc::new(FakeAnnotator::default().with_empty_on("hollow"));
        let (_dir, layout, processor) = setup(fake);
        let rel = Path::new("a.txt");
        write_chunk(&layout, rel, 0, b"hollow line\n");

        let outcome = processor.process(rel, 0).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Quarantined);
        assert!(layout.invalid_marker_path(rel, 0).exists());
        assert!(!layout.part_path(rel, 0).exists());
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let fake = Arc::new(FakeAnnotator::default());
        let (_dir, layout, processor) = setup(fake);
        let rel = Path::new("a.txt");
        std::fs::create_dir_all(layout.work_dir(rel)).unwrap();

        // No part, no marker, no input: infrastructure problem, not a
        // quarantine.
        assert!(processor.process(rel, 0).await.is_err());
        assert!(!layout.invalid_marker_path(rel, 0).exists());
    }
}
