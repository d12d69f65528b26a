//! Filesystem layout shared by every pipeline stage.
//!
//! All coordination state lives on disk under the destination root:
//!
//! ```text
//! DST_ROOT/<relpath stem>.<ext>                         reassembled output
//! DST_ROOT/.work/<relpath>/chunk_NNNN.txt               chunk inputs
//! DST_ROOT/.work/<relpath>/chunk_NNNN.txt.<ext>.part    successful chunk outputs
//! DST_ROOT/.work/<relpath>/chunk_NNNN.txt.invalid       quarantine markers
//! DST_ROOT/.work/<relpath>/.split_done                  split-completion marker
//! DST_ROOT/.invalid/<relpath>/chunk_NNNN.txt            quarantined chunk inputs
//! ```
//!
//! Ordinals are zero-padded to a fixed width so lexical order equals numeric
//! order when part files are concatenated.

use std::path::{Path, PathBuf};

/// Directory under the destination root holding per-file work directories.
pub const WORK_DIR_NAME: &str = ".work";

/// Directory under the destination root holding quarantined chunk inputs.
pub const INVALID_DIR_NAME: &str = ".invalid";

/// Marker written to a work directory once splitting has finished.
pub const SPLIT_DONE_MARKER: &str = ".split_done";

/// Prefix of every chunk input file name.
pub const CHUNK_PREFIX: &str = "chunk_";

/// Extension of every chunk input file name (including the dot).
pub const CHUNK_SUFFIX: &str = ".txt";

/// Suffix appended to a chunk name to mark it quarantined.
pub const INVALID_MARKER_SUFFIX: &str = ".invalid";

/// Suffix of successful chunk outputs, appended after the output extension.
pub const PART_SUFFIX: &str = ".part";

/// Suffix of in-progress temporary files, always safe to delete.
pub const TMP_SUFFIX: &str = ".tmp";

/// Name of the temporary file reassembly writes before the final rename.
pub const OUTPUT_TMP_NAME: &str = ".output.tmp";

/// Zero-padded width of the chunk ordinal.
pub const ORDINAL_WIDTH: usize = 4;

/// Largest chunk count the zero-padded names keep in lexical order.
pub const MAX_CHUNKS: usize = 10_000;

/// Path scheme for one corpus run.
///
/// Holds the two roots and the output extension; everything else is derived.
/// Cloning is cheap enough to hand a copy to each component.
#[derive(Debug, Clone)]
pub struct Layout {
    src_root: PathBuf,
    dst_root: PathBuf,
    output_ext: String,
}

impl Layout {
    /// Create a layout for the given roots and output extension (without the
    /// leading dot, e.g. `"tok"`).
    pub fn new(src_root: impl Into<PathBuf>, dst_root: impl Into<PathBuf>, output_ext: &str) -> Self {
        Self {
            src_root: src_root.into(),
            dst_root: dst_root.into(),
            output_ext: output_ext.to_string(),
        }
    }

    /// Corpus root the walker reads from.
    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    /// Destination root everything is written under.
    pub fn dst_root(&self) -> &Path {
        &self.dst_root
    }

    /// Extension of reassembled output files.
    pub fn output_ext(&self) -> &str {
        &self.output_ext
    }

    /// Absolute path of a source file given its corpus-relative path.
    pub fn source_path(&self, rel: &Path) -> PathBuf {
        self.src_root.join(rel)
    }

    /// Final output path: destination root plus the relative path with the
    /// extension swapped.
    pub fn output_path(&self, rel: &Path) -> PathBuf {
        self.dst_root.join(rel.with_extension(&self.output_ext))
    }

    /// Work directory holding the chunks of one source file.
    pub fn work_dir(&self, rel: &Path) -> PathBuf {
        self.dst_root.join(WORK_DIR_NAME).join(rel)
    }

    /// Quarantine directory holding the rejected chunk inputs of one file.
    pub fn invalid_dir(&self, rel: &Path) -> PathBuf {
        self.dst_root.join(INVALID_DIR_NAME).join(rel)
    }

    /// Split-completion marker for one file.
    pub fn split_marker(&self, rel: &Path) -> PathBuf {
        self.work_dir(rel).join(SPLIT_DONE_MARKER)
    }

    /// File name of a chunk input, e.g. `chunk_0007.txt`.
    pub fn chunk_file_name(&self, ordinal: usize) -> String {
        format!("{CHUNK_PREFIX}{ordinal:0width$}{CHUNK_SUFFIX}", width = ORDINAL_WIDTH)
    }

    /// File name of a successful chunk output, e.g. `chunk_0007.txt.tok.part`.
    pub fn part_file_name(&self, ordinal: usize) -> String {
        format!("{}.{}{}", self.chunk_file_name(ordinal), self.output_ext, PART_SUFFIX)
    }

    /// File name of a quarantine marker, e.g. `chunk_0007.txt.invalid`.
    pub fn invalid_marker_name(&self, ordinal: usize) -> String {
        format!("{}{}", self.chunk_file_name(ordinal), INVALID_MARKER_SUFFIX)
    }

    /// Path of a chunk input inside the work directory.
    pub fn chunk_path(&self, rel: &Path, ordinal: usize) -> PathBuf {
        self.work_dir(rel).join(self.chunk_file_name(ordinal))
    }

    /// Path of a successful chunk output inside the work directory.
    pub fn part_path(&self, rel: &Path, ordinal: usize) -> PathBuf {
        self.work_dir(rel).join(self.part_file_name(ordinal))
    }

    /// Path of a quarantine marker inside the work directory.
    pub fn invalid_marker_path(&self, rel: &Path, ordinal: usize) -> PathBuf {
        self.work_dir(rel).join(self.invalid_marker_name(ordinal))
    }

    /// Path reassembly writes to before renaming onto the output path.
    pub fn output_tmp_path(&self, rel: &Path) -> PathBuf {
        self.work_dir(rel).join(OUTPUT_TMP_NAME)
    }

    /// Parse the ordinal out of a chunk input name (`chunk_0012.txt` -> 12).
    pub fn parse_chunk_name(&self, name: &str) -> Option<usize> {
        parse_ordinal(name, CHUNK_SUFFIX)
    }

    /// Parse the ordinal out of a part file name
    /// (`chunk_0012.txt.tok.part` -> 12).
    pub fn parse_part_name(&self, name: &str) -> Option<usize> {
        let suffix = format!("{}.{}{}", CHUNK_SUFFIX, self.output_ext, PART_SUFFIX);
        parse_ordinal(name, &suffix)
    }

    /// Parse the ordinal out of a quarantine marker name
    /// (`chunk_0012.txt.invalid` -> 12).
    pub fn parse_invalid_marker_name(&self, name: &str) -> Option<usize> {
        let suffix = format!("{}{}", CHUNK_SUFFIX, INVALID_MARKER_SUFFIX);
        parse_ordinal(name, &suffix)
    }
}

/// Whether a file name denotes in-progress temporary output.
pub fn is_tmp_name(name: &str) -> bool {
    name.ends_with(TMP_SUFFIX)
}

/// Append the temporary suffix to a path.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(TMP_SUFFIX);
    PathBuf::from(os)
}

fn parse_ordinal(name: &str, suffix: &str) -> Option<usize> {
    let rest = name.strip_prefix(CHUNK_PREFIX)?;
    let digits = rest.get(..ORDINAL_WIDTH)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if &rest[ORDINAL_WIDTH..] != suffix {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new("/corpus", "/out", "tok")
    }

    #[test]
    fn test_output_path_swaps_extension() {
        let layout = layout();
        assert_eq!(
            layout.output_path(Path::new("novels/quijote.txt")),
            PathBuf::from("/out/novels/quijote.tok")
        );
        assert_eq!(
            layout.output_path(Path::new("a.txt")),
            PathBuf::from("/out/a.tok")
        );
    }

    #[test]
    fn test_work_and_invalid_dirs_preserve_relative_path() {
        let layout = layout();
        assert_eq!(
            layout.work_dir(Path::new("sub/dir/a.txt")),
            PathBuf::from("/out/.work/sub/dir/a.txt")
        );
        assert_eq!(
            layout.invalid_dir(Path::new("sub/dir/a.txt")),
            PathBuf::from("/out/.invalid/sub/dir/a.txt")
        );
    }

    #[test]
    fn test_chunk_names_are_zero_padded() {
        let layout = layout();
        assert_eq!(layout.chunk_file_name(0), "chunk_0000.txt");
        assert_eq!(layout.chunk_file_name(42), "chunk_0042.txt");
        assert_eq!(layout.chunk_file_name(9999), "chunk_9999.txt");
        assert_eq!(layout.part_file_name(7), "chunk_0007.txt.tok.part");
        assert_eq!(layout.invalid_marker_name(7), "chunk_0007.txt.invalid");
    }

    #[test]
    fn test_lexical_order_equals_numeric_order() {
        let layout = layout();
        let mut names: Vec<String> = (0..MAX_CHUNKS).step_by(997).map(|i| layout.chunk_file_name(i)).collect();
        let numeric = names.clone();
        names.sort();
        assert_eq!(names, numeric);
    }

    #[test]
    fn test_parse_round_trips() {
        let layout = layout();
        assert_eq!(layout.parse_chunk_name(&layout.chunk_file_name(12)), Some(12));
        assert_eq!(layout.parse_part_name(&layout.part_file_name(12)), Some(12));
        assert_eq!(
            layout.parse_invalid_marker_name(&layout.invalid_marker_name(12)),
            Some(12)
        );
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        let layout = layout();
        assert_eq!(layout.parse_chunk_name("chunk_12.txt"), None);
        assert_eq!(layout.parse_chunk_name("chunk_00a1.txt"), None);
        assert_eq!(layout.parse_chunk_name("chunk_0001.tok"), None);
        assert_eq!(layout.parse_chunk_name(".split_done"), None);
        assert_eq!(layout.parse_part_name("chunk_0001.txt.part"), None);
        assert_eq!(layout.parse_chunk_name("chunk_0001.txt.tmp"), None);
        assert_eq!(layout.parse_part_name("chunk_0001.txt.tok.part.tmp"), None);
    }

    #[test]
    fn test_parse_respects_output_extension() {
        let other = Layout::new("/corpus", "/out", "ann");
        assert_eq!(other.part_file_name(3), "chunk_0003.txt.ann.part");
        assert_eq!(other.parse_part_name("chunk_0003.txt.ann.part"), Some(3));
        assert_eq!(other.parse_part_name("chunk_0003.txt.tok.part"), None);
    }

    #[test]
    fn test_tmp_names() {
        assert!(is_tmp_name("chunk_0001.txt.tok.part.tmp"));
        assert!(is_tmp_name(OUTPUT_TMP_NAME));
        assert!(!is_tmp_name("chunk_0001.txt.tok.part"));
        assert_eq!(
            tmp_path(Path::new("/out/.work/a.txt/chunk_0001.txt.tok.part")),
            PathBuf::from("/out/.work/a.txt/chunk_0001.txt.tok.part.tmp")
        );
    }
}
