//! Corpus annotation CLI
//!
//! Splits corpus files into chunks, annotates them with an external tool,
//! and reassembles the outputs. Safe to interrupt and rerun.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use corpus_annotate::{CancelToken, Config, Layout, build_runtime, corpus_status, run_corpus};

const DEFAULT_CONFIG_PATH: &str = "corpus-annotate.yaml";

/// Exit code for runs stopped by an interrupt signal.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "corpus-annotate")]
#[command(about = "Annotate a text corpus with an external line-oriented tool", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Override concurrency level
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Root directory of the source corpus
    input: Option<PathBuf>,

    /// Root directory for annotated output
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the annotation pipeline (default if no command specified)
    Run {
        /// Root directory of the source corpus (falls back to the configuration file)
        input: Option<PathBuf>,

        /// Root directory for annotated output (falls back to the configuration file)
        output: Option<PathBuf>,
    },

    /// Report corpus progress without processing anything
    Status {
        /// Root directory of the source corpus
        input: PathBuf,

        /// Root directory for annotated output
        output: PathBuf,
    },

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        None => {
            let (Some(input), Some(output)) = (cli.input, cli.output) else {
                anyhow::bail!(
                    "Missing corpus roots.\nUsage: corpus-annotate <INPUT_ROOT> <OUTPUT_ROOT>"
                );
            };
            run_command(cli.config, cli.concurrency, Some(input), Some(output))
        }

        Some(Commands::Run { input, output }) => {
            run_command(cli.config, cli.concurrency, input, output)
        }

        Some(Commands::Status { input, output }) => {
            status_command(cli.config, input, output)?;
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Validate) => {
            validate_command(cli.config)?;
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_command(
    config_path: PathBuf,
    concurrency: Option<usize>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut config = load_config(&config_path)?;

    // Apply overrides
    if let Some(c) = concurrency {
        config.processing.concurrency = c;
    }
    if input.is_some() {
        config.corpus.input_root = input;
    }
    if output.is_some() {
        config.corpus.output_root = output;
    }

    if config.corpus.input_root.is_none() || config.corpus.output_root.is_none() {
        anyhow::bail!(
            "Corpus roots are required, pass them as arguments or set them in {}",
            config_path.display()
        );
    }

    config.validate()?;

    // Build and run Tokio runtime
    let runtime = build_runtime(config.processing.worker_threads)?;
    let summary = runtime.block_on(async {
        let cancel = CancelToken::new();
        tokio::spawn(interrupt_watcher(cancel.clone()));
        run_corpus(config, cancel).await
    })?;

    println!("{}", summary);

    if summary.interrupted {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Cancel the run on the first interrupt so in-flight chunks can drain;
/// a second interrupt exits outright. The listener stays alive for the
/// whole run because a registered signal handler never reverts to the
/// default disposition.
async fn interrupt_watcher(cancel: CancelToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!("Interrupt received, finishing in-flight chunks");
    cancel.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Second interrupt, exiting immediately");
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    }
}

/// Load the configuration, tolerating an absent file only at the default
/// location. An explicitly requested file must exist.
fn load_config(path: &Path) -> Result<Config> {
    load_config_from(path, Path::new(DEFAULT_CONFIG_PATH))
}

fn load_config_from(path: &Path, default_path: &Path) -> Result<Config> {
    if path.exists() {
        return Config::from_file(path);
    }
    if path == default_path {
        return Ok(Config::default());
    }
    anyhow::bail!("Configuration file {} not found", path.display())
}

fn status_command(config_path: PathBuf, input: PathBuf, output: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    let layout = Layout::new(input, output, &config.corpus.output_extension);

    let runtime = build_runtime(None)?;
    let status = runtime.block_on(corpus_status(&layout, &config.corpus.input_extension))?;

    println!("\n=== Corpus Status ===");
    println!("Files total: {}", status.files_total);
    println!("Files completed: {}", status.files_completed);
    println!("Files all-invalid: {}", status.files_all_invalid);
    println!("Files in progress: {}", status.files_in_progress);
    println!("Files unstarted: {}", status.files_unstarted);
    if status.files_in_progress > 0 {
        println!("\n--- Chunks in partial files ---");
        println!("Succeeded: {}", status.chunks_succeeded);
        println!("Quarantined: {}", status.chunks_quarantined);
        println!("Pending: {}", status.chunks_pending);
    }
    println!("=====================\n");

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# Corpus annotation pipeline configuration

# === CORPUS: What to read and where to write ===
corpus:
  # Roots usually come from the command line:
  #   corpus-annotate <INPUT_ROOT> <OUTPUT_ROOT>
  # Set them here to let bare `corpus-annotate run` work.
  # input_root: "/data/corpus"
  # output_root: "/data/annotated"

  # Extension of source files to pick up (without the dot)
  input_extension: "txt"

  # Extension of annotated output files (without the dot)
  output_extension: "tok"

# === ANNOTATOR: External tool run over each chunk ===
annotator:
  # Executable invoked once per chunk; reads stdin, writes stdout
  command: "analyze"

  # Extra arguments placed before the configuration flag
  args: []

  # Flag that introduces the tool configuration path
  config_flag: "-f"

  # Tool configuration file (omit to run without one)
  # config_path: "/etc/annotator/profile.cfg"

  # Kill a chunk invocation after this many seconds (omit for no limit)
  # timeout_secs: 600

# === PROCESSING: Performance tuning ===
processing:
  # Lines per chunk when splitting source files
  chunk_lines: 5000

  # Number of chunks annotated concurrently
  concurrency: 4

  # Tokio async worker threads (null = num CPUs)
  # worker_threads: 8

# === REPORTING: Progress output ===
reporting:
  # Print throughput metrics during processing
  enable_metrics: true

  # Metrics reporting interval in seconds
  metrics_interval_secs: 10

  # Save a metrics JSON when the run ends (omit to skip)
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
