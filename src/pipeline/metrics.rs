//! Throughput monitoring and metrics collection.

use serde::{Serialize, Serializer};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Files reassembled into final outputs this run
    pub files_completed: AtomicU64,

    /// Files skipped because a prior run already concluded them
    pub files_skipped: AtomicU64,

    /// Files whose every chunk is quarantined
    pub files_all_invalid: AtomicU64,

    /// Files left with unresolved chunks
    pub files_incomplete: AtomicU64,

    /// Chunks annotated by the external tool this run
    pub chunks_annotated: AtomicU64,

    /// Chunks whose prior part file or quarantine marker was reused
    pub chunks_reused: AtomicU64,

    /// Chunks quarantined this run
    pub chunks_quarantined: AtomicU64,

    /// Total chunk input bytes read
    pub bytes_read: AtomicU64,

    /// Total annotated bytes written
    pub bytes_written: AtomicU64,

    /// Start time
    start_time: Option<Instant>,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Self::default()
        })
    }

    /// Record a completed file.
    pub fn add_file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped file.
    pub fn add_file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an all-invalid file.
    pub fn add_file_all_invalid(&self) {
        self.files_all_invalid.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an incomplete file.
    pub fn add_file_incomplete(&self) {
        self.files_incomplete.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a freshly annotated chunk.
    pub fn add_chunk_annotated(&self) {
        self.chunks_annotated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record chunks resolved by an earlier run.
    pub fn add_chunks_reused(&self, count: u64) {
        self.chunks_reused.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a quarantined chunk.
    pub fn add_chunk_quarantined(&self) {
        self.chunks_quarantined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes read.
    pub fn add_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record bytes written.
    pub fn add_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get throughput in MB/s for reads.
    pub fn read_throughput_mbps(&self) -> f64 {
        let bytes = self.bytes_read.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (bytes as f64) / (1024.0 * 1024.0) / elapsed
        } else {
            0.0
        }
    }

    /// Get throughput in MB/s for writes.
    pub fn write_throughput_mbps(&self) -> f64 {
        let bytes = self.bytes_written.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (bytes as f64) / (1024.0 * 1024.0) / elapsed
        } else {
            0.0
        }
    }

    /// Get freshly annotated chunks per second.
    pub fn chunks_per_second(&self) -> f64 {
        let chunks = self.chunks_annotated.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            chunks as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_completed: self.files_completed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_all_invalid: self.files_all_invalid.load(Ordering::Relaxed),
            files_incomplete: self.files_incomplete.load(Ordering::Relaxed),
            chunks_annotated: self.chunks_annotated.load(Ordering::Relaxed),
            chunks_reused: self.chunks_reused.load(Ordering::Relaxed),
            chunks_quarantined: self.chunks_quarantined.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            read_throughput_mbps: self.read_throughput_mbps(),
            write_throughput_mbps: self.write_throughput_mbps(),
            chunks_per_second: self.chunks_per_second(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub files_completed: u64,
    pub files_skipped: u64,
    pub files_all_invalid: u64,
    pub files_incomplete: u64,
    pub chunks_annotated: u64,
    pub chunks_reused: u64,
    pub chunks_quarantined: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub read_throughput_mbps: f64,
    pub write_throughput_mbps: f64,
    pub chunks_per_second: f64,
}

impl MetricsSnapshot {
    /// Files concluded so far, whatever the verdict.
    pub fn files_concluded(&self) -> u64 {
        self.files_completed + self.files_skipped + self.files_all_invalid + self.files_incomplete
    }

    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path.display());
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Files: {} completed, {} skipped, {} invalid | \
             Chunks: {} annotated, {} reused, {} quarantined | \
             In: {:.1} MB @ {:.1} MB/s | Out: {:.1} MB @ {:.1} MB/s | \
             Rate: {:.1} chunks/s | Elapsed: {:.1}s",
            self.files_completed,
            self.files_skipped,
            self.files_all_invalid,
            self.chunks_annotated,
            self.chunks_reused,
            self.chunks_quarantined,
            self.bytes_read as f64 / (1024.0 * 1024.0),
            self.read_throughput_mbps,
            self.bytes_written as f64 / (1024.0 * 1024.0),
            self.write_throughput_mbps,
            self.chunks_per_second,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Periodic metrics reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
    total_files: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64, total_files: u64) -> Self {
        Self {
            metrics,
            interval_secs,
            total_files,
        }
    }

    /// Start the periodic reporter.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    let progress = if self.total_files > 0 {
                        snapshot.files_concluded() as f64 / self.total_files as f64 * 100.0
                    } else {
                        0.0
                    };

                    tracing::info!("[{:.1}%] {}", progress, snapshot);
                }
                _ = shutdown.recv() => {
                    // Final report
                    let snapshot = self.metrics.snapshot();
                    tracing::info!("Final: {}", snapshot);
                    break;
                }
            }
        }
    }

    /// Print a final summary.
    pub fn print_summary(&self) {
        let snapshot = self.metrics.snapshot();

        println!("\n=== Run Summary ===");
        println!("Total time: {:.1}s", snapshot.elapsed.as_secs_f64());
        println!("Files completed: {}", snapshot.files_completed);
        println!("Files skipped: {}", snapshot.files_skipped);
        println!("Files all-invalid: {}", snapshot.files_all_invalid);
        println!("Files incomplete: {}", snapshot.files_incomplete);
        println!("Chunks annotated: {}", snapshot.chunks_annotated);
        println!("Chunks reused: {}", snapshot.chunks_reused);
        println!("Chunks quarantined: {}", snapshot.chunks_quarantined);
        println!(
            "Data read: {:.2} MB",
            snapshot.bytes_read as f64 / (1024.0 * 1024.0)
        );
        println!(
            "Data written: {:.2} MB",
            snapshot.bytes_written as f64 / (1024.0 * 1024.0)
        );
        println!("Read throughput: {:.2} MB/s", snapshot.read_throughput_mbps);
        println!("Write throughput: {:.2} MB/s", snapshot.write_throughput_mbps);
        println!("Annotation rate: {:.1} chunks/s", snapshot.chunks_per_second);
        println!("===================\n");
    }
}
