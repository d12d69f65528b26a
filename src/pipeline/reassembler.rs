//! Assemble annotated parts into final outputs.

use crate::corpus::Layout;
use crate::pipeline::scheduler::FileReport;
use anyhow::{Context, Result, bail};
use std::fs::File;
use std::path::Path;

/// How a file ended up after scheduling and reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDisposition {
    /// Output written, work directory removed
    Completed,

    /// Every chunk quarantined, no output produced
    AllInvalid,

    /// Unresolved chunks remain, work directory retained for a later run
    Incomplete,

    /// Nothing to do, output or all-invalid verdict already existed
    Skipped,
}

/// Concatenates part files into the final output once a file is fully
/// resolved.
///
/// The output is staged next to its final path and renamed into place, so
/// readers never observe a partially written output. Quarantined chunks
/// contribute nothing; their span is simply absent from the output.
pub struct Reassembler {
    layout: Layout,
}

impl Reassembler {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Conclude one file according to its report.
    ///
    /// Complete files are reassembled and their work directory removed.
    /// All-invalid files keep only the quarantine store, which later runs
    /// read as the skip verdict. Incomplete files are left as they are.
    pub async fn finish_file(&self, rel: &Path, report: &FileReport) -> Result<FileDisposition> {
        if report.is_all_invalid() {
            tracing::warn!(
                "All {} chunks of {} quarantined, no output will be produced",
                report.total,
                rel.display()
            );
            self.remove_work_dir(rel).await?;
            return Ok(FileDisposition::AllInvalid);
        }

        if report.is_complete() {
            let layout = self.layout.clone();
            let rel_buf = rel.to_path_buf();
            let total = report.total;
            tokio::task::spawn_blocking(move || concatenate_sync(&layout, &rel_buf, total))
                .await
                .context("Reassembly task panicked")??;
            self.remove_work_dir(rel).await?;
            return Ok(FileDisposition::Completed);
        }

        tracing::info!(
            "{} left incomplete ({} of {} chunks unresolved)",
            rel.display(),
            report.unresolved,
            report.total
        );
        Ok(FileDisposition::Incomplete)
    }

    async fn remove_work_dir(&self, rel: &Path) -> Result<()> {
        let work_dir = self.layout.work_dir(rel);
        tokio::fs::remove_dir_all(&work_dir)
            .await
            .with_context(|| format!("Failed to remove work directory {}", work_dir.display()))
    }
}

fn concatenate_sync(layout: &Layout, rel: &Path, total: usize) -> Result<()> {
    let output = layout.output_path(rel);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let tmp = layout.output_tmp_path(rel);
    let mut writer = File::create(&tmp)
        .with_context(|| format!("Failed to create output staging file {}", tmp.display()))?;

    let mut included = 0usize;
    for ordinal in 0..total {
        let part = layout.part_path(rel, ordinal);
        let mut reader = match File::open(&part) {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // A missing part is only legitimate for a quarantined chunk.
                if layout.invalid_marker_path(rel, ordinal).exists() {
                    continue;
                }
                bail!(
                    "Chunk {} of {} has neither part file nor quarantine marker",
                    ordinal,
                    rel.display()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open part {}", part.display()));
            }
        };
        std::io::copy(&mut reader, &mut writer)
            .with_context(|| format!("Failed to append part {}", part.display()))?;
        included += 1;
    }

    writer
        .sync_all()
        .with_context(|| format!("Failed to sync {}", tmp.display()))?;
    std::fs::rename(&tmp, &output)
        .with_context(|| format!("Failed to publish output {}", output.display()))?;

    tracing::info!("Wrote {} ({} of {} chunks)", output.display(), included, total);
    Ok(())
}
