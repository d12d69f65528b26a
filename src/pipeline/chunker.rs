//! Split source files into fixed-line-count chunk inputs.

use crate::corpus::layout::{self, Layout};
use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Split one source file into chunk inputs of at most `chunk_lines` lines.
///
/// Splitting happens at most once per file: when the completion marker is
/// already present the existing chunks are kept untouched. Without the
/// marker, chunk inputs left by an interrupted split are discarded and the
/// split is redone from scratch. Chunk bytes concatenated in ordinal order
/// equal the source bytes exactly, and every file yields at least one chunk,
/// so an empty source produces one empty chunk rather than none.
pub async fn ensure_split(layout: &Layout, rel: &Path, chunk_lines: usize) -> Result<()> {
    let layout = layout.clone();
    let rel = rel.to_path_buf();
    tokio::task::spawn_blocking(move || split_sync(&layout, &rel, chunk_lines))
        .await
        .context("Split task panicked")?
}

fn split_sync(layout: &Layout, rel: &Path, chunk_lines: usize) -> Result<()> {
    let work_dir = layout.work_dir(rel);
    let marker = layout.split_marker(rel);

    if marker.exists() {
        tracing::debug!("Split marker present for {}, keeping existing chunks", rel.display());
        return Ok(());
    }

    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;

    discard_stale_chunks(layout, &work_dir)?;

    let src = layout.source_path(rel);
    let file = File::open(&src).with_context(|| format!("Failed to open source file {}", src.display()))?;
    let mut reader = BufReader::new(file);

    let mut ordinal = 0usize;
    let mut lines_in_chunk = 0usize;
    let mut writer = open_chunk(layout, rel, ordinal)?;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Failed to read {}", src.display()))?;
        if n == 0 {
            break;
        }

        if lines_in_chunk == chunk_lines {
            finish_chunk(rel, ordinal, writer)?;
            ordinal += 1;
            if ordinal >= layout::MAX_CHUNKS {
                bail!(
                    "{} splits into more than {} chunks; raise chunk_lines",
                    src.display(),
                    layout::MAX_CHUNKS
                );
            }
            writer = open_chunk(layout, rel, ordinal)?;
            lines_in_chunk = 0;
        }

        writer
            .write_all(&line)
            .with_context(|| format!("Failed to write chunk {} of {}", ordinal, rel.display()))?;
        lines_in_chunk += 1;
    }

    finish_chunk(rel, ordinal, writer)?;

    std::fs::write(&marker, b"")
        .with_context(|| format!("Failed to write split marker {}", marker.display()))?;

    tracing::debug!("Split {} into {} chunks", rel.display(), ordinal + 1);
    Ok(())
}

fn open_chunk(layout: &Layout, rel: &Path, ordinal: usize) -> Result<BufWriter<File>> {
    let path = layout.chunk_path(rel, ordinal);
    let file =
        File::create(&path).with_context(|| format!("Failed to create chunk file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn finish_chunk(rel: &Path, ordinal: usize, mut writer: BufWriter<File>) -> Result<()> {
    writer
        .flush()
        .with_context(|| format!("Failed to flush chunk {} of {}", ordinal, rel.display()))
}

/// Remove chunk inputs left behind by a split that never reached its marker.
fn discard_stale_chunks(layout: &Layout, work_dir: &Path) -> Result<()> {
    let mut discarded = 0usize;
    for entry in std::fs::read_dir(work_dir)
        .with_context(|| format!("Failed to list work directory {}", work_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if layout.parse_chunk_name(name).is_some() {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove stale chunk {}", name))?;
            discarded += 1;
        }
    }
    if discarded > 0 {
        tracing::warn!(
            "Discarded {} chunk inputs from an interrupted split in {}",
            discarded,
            work_dir.display()
        );
    }
    Ok(())
}
