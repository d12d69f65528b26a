//! Corpus Annotation Pipeline
//!
//! Splits every text file in a corpus into fixed-line-count chunks, runs an
//! external line-oriented annotation tool over the chunks with bounded
//! concurrency, and reassembles the results into one output file per input
//! file. Progress lives entirely on disk, so an interrupted run resumes
//! exactly where it stopped and never redoes finished work.
//!
//! # Architecture
//!
//! - **Corpus**: path scheme, file discovery, per-file orchestration
//! - **Annotate**: the external tool boundary, one trait with one method
//! - **Pipeline**: split, concurrent chunk processing, quarantine, reassembly
//!
//! # Usage
//!
//! ```no_run
//! use corpus_annotate::{CancelToken, Config, run_corpus};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::from_file(Path::new("corpus-annotate.yaml"))?;
//!     config.corpus.input_root = Some("corpus".into());
//!     config.corpus.output_root = Some("annotated".into());
//!     run_corpus(config, CancelToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod annotate;
pub mod cancel;
pub mod config;
pub mod corpus;
pub mod pipeline;

pub use annotate::{Annotator, ExternalTool};
pub use cancel::CancelToken;
pub use config::Config;
pub use corpus::{CorpusStatus, CorpusWalker, Layout, RunSummary, WalkerConfig, corpus_status};
pub use pipeline::{ChunkProcessor, Metrics, Reassembler, Scheduler};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Run the full annotation pipeline with the given configuration.
pub async fn run_corpus(config: Config, cancel: CancelToken) -> Result<RunSummary> {
    // Validate configuration
    config.validate()?;

    let input_root = config
        .corpus
        .input_root
        .clone()
        .context("Input root is required")?;
    let output_root = config
        .corpus
        .output_root
        .clone()
        .context("Output root is required")?;

    tracing::info!(
        "Annotating corpus {} into {}",
        input_root.display(),
        output_root.display()
    );
    tracing::info!(
        "Annotator: {} {}",
        config.annotator.command,
        config.annotator.args.join(" ")
    );

    let layout = Layout::new(input_root, output_root, &config.corpus.output_extension);

    let annotator: Arc<dyn Annotator> = Arc::new(ExternalTool::from_config(&config.annotator));
    let metrics = Metrics::new();

    let processor = Arc::new(ChunkProcessor::new(annotator, layout.clone(), metrics.clone()));
    let scheduler = Scheduler::new(processor, config.processing.concurrency, cancel.clone());
    let reassembler = Reassembler::new(layout.clone());

    let walker_config = WalkerConfig {
        chunk_lines: config.processing.chunk_lines,
        input_ext: config.corpus.input_extension.clone(),
        enable_metrics: config.reporting.enable_metrics,
        metrics_interval_secs: config.reporting.metrics_interval_secs,
    };

    let walker = CorpusWalker::new(
        layout,
        scheduler,
        reassembler,
        metrics.clone(),
        cancel,
        walker_config,
    );

    let summary = walker.run().await?;

    if let Some(path) = &config.reporting.metrics_output_path {
        if let Err(e) = metrics.snapshot().save_to_file(path) {
            tracing::warn!("Failed to save metrics to {}: {}", path.display(), e);
        }
    }

    tracing::info!("Corpus walk complete: {}", summary);

    Ok(summary)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
