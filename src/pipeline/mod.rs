//! Pipeline orchestration for chunk processing.

mod chunker;
mod metrics;
mod processor;
mod reassembler;
mod scheduler;
mod state;


pub use chunker::ensure_split;
pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use processor::{ChunkOutcome, ChunkProcessor};
pub use reassembler::{FileDisposition, Reassembler};
pub use scheduler::{FileReport, Scheduler};
pub use state::{
    ChunkStatus, FileState, inspect_work_dir, scan_work_dir, sweep_tmp_files,
};
