//! Configuration for the corpus annotation pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the annotation pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Corpus location and naming
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// External annotation tool
    #[serde(default)]
    pub annotator: AnnotatorConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Progress reporting
    #[serde(default)]
    pub reporting: ReportingConfig,
}

/// Corpus roots and file naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Root directory of the source corpus.
    /// Usually given on the command line instead.
    #[serde(default)]
    pub input_root: Option<PathBuf>,

    /// Root directory for annotated output.
    /// Usually given on the command line instead.
    #[serde(default)]
    pub output_root: Option<PathBuf>,

    /// Extension of source files to pick up, without the dot
    #[serde(default = "default_input_extension")]
    pub input_extension: String,

    /// Extension of the annotated output files, without the dot
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            input_root: None,
            output_root: None,
            input_extension: default_input_extension(),
            output_extension: default_output_extension(),
        }
    }
}

/// External annotation tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// Executable to run for each chunk
    #[serde(default = "default_command")]
    pub command: String,

    /// Extra arguments passed before the configuration flag
    #[serde(default)]
    pub args: Vec<String>,

    /// Flag that introduces the tool configuration path
    #[serde(default = "default_config_flag")]
    pub config_flag: String,

    /// Tool configuration file, appended after `config_flag` when set
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    /// Kill a chunk invocation that runs longer than this
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            config_flag: default_config_flag(),
            config_path: None,
            timeout_secs: None,
        }
    }
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Lines per chunk when splitting source files
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Number of concurrent chunk processors
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_lines: default_chunk_lines(),
            concurrency: default_concurrency(),
            worker_threads: None,
        }
    }
}

/// Progress reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Enable metrics reporting
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<PathBuf>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_interval_secs: default_metrics_interval(),
            metrics_output_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // Try YAML first (it's a superset of JSON)
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(input_root) = &self.corpus.input_root {
            if !input_root.is_dir() {
                anyhow::bail!("Input root {} is not a directory", input_root.display());
            }
            if let Some(output_root) = &self.corpus.output_root {
                if resolved(output_root).starts_with(resolved(input_root)) {
                    anyhow::bail!("Output root must not live inside the input root");
                }
            }
        }

        if self.corpus.input_extension.is_empty() {
            anyhow::bail!("Input extension must not be empty");
        }
        if self.corpus.output_extension.is_empty() {
            anyhow::bail!("Output extension must not be empty");
        }
        if self.annotator.command.is_empty() {
            anyhow::bail!("Annotator command must not be empty");
        }
        if let Some(config_path) = &self.annotator.config_path {
            if !config_path.exists() {
                anyhow::bail!("Annotator configuration {} not found", config_path.display());
            }
        }
        if self.annotator.timeout_secs == Some(0) {
            anyhow::bail!("Annotator timeout must be > 0 when set");
        }
        if self.processing.chunk_lines == 0 {
            anyhow::bail!("Chunk lines must be > 0");
        }
        if self.processing.concurrency == 0 {
            anyhow::bail!("Concurrency must be > 0");
        }
        if self.reporting.metrics_interval_secs == 0 {
            anyhow::bail!("Metrics interval must be > 0");
        }
        Ok(())
    }
}

/// Resolve symlinks and relative components where possible, so the nesting
/// check is not fooled by differing spellings of the same directory. A path
/// that does not exist yet resolves through its closest existing ancestor.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => resolved(parent).join(name),
        _ => path.to_path_buf(),
    }
}

// Default value functions for serde
fn default_input_extension() -> String { "txt".to_string() }
fn default_output_extension() -> String { "tok".to_string() }
fn default_command() -> String { "analyze".to_string() }
fn default_config_flag() -> String { "-f".to_string() }
fn default_chunk_lines() -> usize { 5000 }
fn default_concurrency() -> usize { 4 }
fn default_true() -> bool { true }
fn default_metrics_interval() -> u64 { 10 }
