//! Rebuild per-file progress from the work directory on disk.
//!
//! No state is persisted beyond the artifacts themselves: a part file means
//! the chunk succeeded, a quarantine marker means it failed permanently, and
//! a chunk input with neither is still pending. Scanning the work directory
//! after any crash therefore yields exactly the progress that survived.

use crate::corpus::layout::{self, Layout};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Resolution status of a single chunk, derived from on-disk artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Succeeded,
    Quarantined,
}

/// Per-file progress reconstructed by scanning the work directory.
#[derive(Debug, Clone)]
pub struct FileState {
    statuses: Vec<ChunkStatus>,
}

impl FileState {
    pub fn total(&self) -> usize {
        self.statuses.len()
    }

    pub fn succeeded(&self) -> usize {
        self.statuses.iter().filter(|s| **s == ChunkStatus::Succeeded).count()
    }

    pub fn quarantined(&self) -> usize {
        self.statuses.iter().filter(|s| **s == ChunkStatus::Quarantined).count()
    }

    /// Ordinals that still need a processing attempt, in ascending order.
    pub fn pending(&self) -> Vec<usize> {
        self.statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ChunkStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    /// Every chunk resolved and at least one succeeded.
    pub fn is_complete(&self) -> bool {
        self.succeeded() > 0 && self.succeeded() + self.quarantined() == self.total()
    }

    /// Every chunk resolved and all of them quarantined.
    pub fn is_all_invalid(&self) -> bool {
        self.total() > 0 && self.quarantined() == self.total()
    }
}

/// Scan a work directory into a [`FileState`], discarding temporary files
/// first so half-written artifacts never count as progress.
pub fn scan_work_dir(layout: &Layout, rel: &Path) -> Result<FileState> {
    sweep_tmp_files(layout, rel)?;
    read_work_dir(layout, rel)
}

/// Read-only variant of [`scan_work_dir`] for status reporting. Temporary
/// files are ignored rather than removed.
pub fn inspect_work_dir(layout: &Layout, rel: &Path) -> Result<FileState> {
    read_work_dir(layout, rel)
}

/// Delete temporary files left in a work directory by interrupted writes.
/// Returns how many were removed.
pub fn sweep_tmp_files(layout: &Layout, rel: &Path) -> Result<usize> {
    let work_dir = layout.work_dir(rel);
    let entries = match std::fs::read_dir(&work_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to list work directory {}", work_dir.display()));
        }
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if layout::is_tmp_name(name) {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove temporary file {}", name))?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!("Swept {} temporary files from {}", removed, work_dir.display());
    }
    Ok(removed)
}

fn read_work_dir(layout: &Layout, rel: &Path) -> Result<FileState> {
    let work_dir = layout.work_dir(rel);
    let entries = match std::fs::read_dir(&work_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FileState { statuses: Vec::new() });
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to list work directory {}", work_dir.display()));
        }
    };

    let mut chunks = BTreeSet::new();
    let mut parts = BTreeSet::new();
    let mut markers = BTreeSet::new();

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if layout::is_tmp_name(name) || name == layout::SPLIT_DONE_MARKER {
            continue;
        }
        if let Some(ordinal) = layout.parse_part_name(name) {
            parts.insert(ordinal);
        } else if let Some(ordinal) = layout.parse_invalid_marker_name(name) {
            markers.insert(ordinal);
        } else if let Some(ordinal) = layout.parse_chunk_name(name) {
            chunks.insert(ordinal);
        } else {
            tracing::debug!("Ignoring unrecognized entry {} in {}", name, work_dir.display());
        }
    }

    let total = chunks
        .iter()
        .chain(parts.iter())
        .chain(markers.iter())
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);

    let mut statuses = vec![ChunkStatus::Pending; total];
    for ordinal in 0..total {
        if parts.contains(&ordinal) {
            if markers.contains(&ordinal) {
                tracing::warn!(
                    "Chunk {} of {} has both a part file and a quarantine marker, treating as succeeded",
                    ordinal,
                    rel.display()
                );
            }
            statuses[ordinal] = ChunkStatus::Succeeded;
        } else if markers.contains(&ordinal) {
            statuses[ordinal] = ChunkStatus::Quarantined;
        }
    }

    Ok(FileState { statuses })
}
