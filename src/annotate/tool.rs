//! Annotator backed by an external process.

use super::Annotator;
use crate::config::AnnotatorConfig;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs the configured command once per chunk, feeding the chunk on stdin and
/// collecting annotated output from stdout.
///
/// The child is spawned with `kill_on_drop`, so a cancelled or timed-out
/// invocation never leaves a stray process behind. On Unix it also runs in
/// its own process group, keeping it out of the terminal's interrupt path.
pub struct ExternalTool {
    command: String,
    args: Vec<String>,
    config_flag: String,
    config_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ExternalTool {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        config_flag: impl Into<String>,
        config_path: Option<PathBuf>,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            config_flag: config_flag.into(),
            config_path,
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            config.config_flag.clone(),
            config.config_path.clone(),
            config.timeout_secs,
        )
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(path) = &self.config_path {
            cmd.arg(&self.config_flag).arg(path);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // A terminal interrupt signals the whole foreground process group;
        // the child gets its own group so in-flight invocations finish
        // instead of dying by signal.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    async fn run_once(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut child = self
            .build_command()
            .spawn()
            .with_context(|| format!("Failed to spawn annotator command '{}'", self.command))?;

        let mut stdin = child.stdin.take().context("Annotator stdin not captured")?;

        // Feed stdin from its own task so a tool that fills its stdout pipe
        // before draining stdin cannot deadlock against us.
        let input = input.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to collect output of '{}'", self.command))?;

        // A broken pipe means the tool exited before reading everything; its
        // exit status decides the outcome in that case.
        if let Ok(Err(e)) = writer.await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e).context("Failed to write chunk to annotator stdin");
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Annotator '{}' exited with {}: {}",
                self.command,
                output.status,
                stderr_tail(&stderr)
            );
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Annotator for ExternalTool {
    async fn annotate(&self, input: &[u8]) -> Result<Vec<u8>> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_once(input))
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "Annotator '{}' timed out after {}s",
                        self.command,
                        limit.as_secs()
                    )
                })?,
            None => self.run_once(input).await,
        }
    }
}

/// Last few lines of the tool's stderr, enough to identify the failure
/// without flooding the log.
fn stderr_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 4;
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    if lines.is_empty() {
        return "(no stderr)".to_string();
    }
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join(" | ")
}
