//! The caller's intent for one run, frozen before the run starts.
//!
//! A UI keeps its own mutable view-state (list boxes, chosen folder, output
//! override) and builds a fresh [`SelectionState`] each time the user presses
//! "convert". The pipeline only ever reads it.

use chrono::Local;
use std::path::{Path, PathBuf};

/// Name of the folder created next to the source when no output directory is given.
pub const DEFAULT_OUTPUT_SUBDIR: &str = "result";

/// What the user picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Explicit files, in the order the UI supplied them.
    Files(Vec<PathBuf>),
    /// A folder whose supported images are collected.
    Directory(PathBuf),
}

impl Selection {
    /// Interpret a drag-and-drop (or command-line) path list.
    ///
    /// If any existing directory is among the paths, the first one wins and
    /// everything else is ignored. Otherwise the paths that exist are taken as
    /// an explicit file list.
    pub fn from_dropped<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if let Some(dir) = paths.iter().find(|p| p.is_dir()) {
            return Selection::Directory(dir.clone());
        }
        Selection::Files(paths.into_iter().filter(|p| p.exists()).collect())
    }

    /// The folder the selection lives in: the directory itself, or the
    /// deepest common parent of the selected files.
    pub fn source_dir(&self) -> Option<PathBuf> {
        match self {
            Selection::Directory(dir) => Some(dir.clone()),
            Selection::Files(files) => common_parent(files),
        }
    }
}

/// Immutable snapshot of one run's input and output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    selection: Selection,
    output_dir: PathBuf,
    output_filename: String,
}

impl SelectionState {
    /// Snapshot with an explicit output location.
    ///
    /// A file name without a `.pdf` extension gets one appended; an empty
    /// name falls back to [`default_output_filename`].
    pub fn new(
        selection: Selection,
        output_dir: impl Into<PathBuf>,
        output_filename: impl AsRef<str>,
    ) -> Self {
        Self {
            selection,
            output_dir: output_dir.into(),
            output_filename: normalise_filename(output_filename.as_ref()),
        }
    }

    /// Snapshot writing `merged_<timestamp>.pdf` into `<source>/result`.
    ///
    /// With an empty file selection the source is unknown and the current
    /// directory is used; the run fails at collection anyway.
    pub fn with_default_output(selection: Selection) -> Self {
        let base = selection.source_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            output_dir: base.join(DEFAULT_OUTPUT_SUBDIR),
            output_filename: default_output_filename(),
            selection,
        }
    }

    /// Same snapshot, different output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Same snapshot, different file name.
    pub fn with_output_filename(mut self, name: impl AsRef<str>) -> Self {
        self.output_filename = normalise_filename(name.as_ref());
        self
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_filename(&self) -> &str {
        &self.output_filename
    }

    /// `output_dir / output_filename`.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }
}

/// `merged_YYYYmmdd_HHMMSS.pdf` in local time.
pub fn default_output_filename() -> String {
    format!("merged_{}.pdf", Local::now().format("%Y%m%d_%H%M%S"))
}

fn normalise_filename(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return default_output_filename();
    }
    if name.to_ascii_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{name}.pdf")
    }
}

/// Deepest directory containing every file's parent.
fn common_parent(files: &[PathBuf]) -> Option<PathBuf> {
    let mut parents = files.iter().map(|f| {
        let abs = std::path::absolute(f).unwrap_or_else(|_| f.clone());
        abs.parent().map(Path::to_path_buf).unwrap_or(abs)
    });
    let first = parents.next()?;
    let mut prefix_len = first.components().count();
    for p in parents {
        let shared = first
            .components()
            .zip(p.components())
            .take_while(|(a, b)| a == b)
            .count();
        prefix_len = prefix_len.min(shared);
    }
    let common: PathBuf = first.components().take(prefix_len).collect();
    if common.as_os_str().is_empty() {
        None
    } else {
        Some(common)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filename_gets_pdf_extension() {
        let s = SelectionState::new(Selection::Files(vec![]), "/out", "album");
        assert_eq!(s.output_filename(), "album.pdf");
        assert_eq!(s.output_path(), PathBuf::from("/out/album.pdf"));

        let s = s.with_output_filename("Album.PDF");
        assert_eq!(s.output_filename(), "Album.PDF");
    }

    #[test]
    fn empty_filename_uses_timestamped_default() {
        let s = SelectionState::new(Selection::Files(vec![]), "/out", "  ");
        assert!(s.output_filename().starts_with("merged_"));
        assert!(s.output_filename().ends_with(".pdf"));
        // merged_ + 8 date digits + _ + 6 time digits + .pdf
        assert_eq!(s.output_filename().len(), "merged_20240101_120000.pdf".len());
    }

    #[test]
    fn default_output_is_result_folder_of_directory() {
        let s = SelectionState::with_default_output(Selection::Directory("/photos/trip".into()));
        assert_eq!(s.output_dir(), Path::new("/photos/trip/result"));
    }

    #[test]
    fn common_parent_of_files() {
        let files = vec![
            PathBuf::from("/a/b/c/1.png"),
            PathBuf::from("/a/b/d/2.png"),
            PathBuf::from("/a/b/3.png"),
        ];
        assert_eq!(common_parent(&files), Some(PathBuf::from("/a/b")));
        assert_eq!(common_parent(&[]), None);
    }

    #[test]
    fn dropped_directory_wins_over_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("x.png");
        std::fs::write(&file, b"x").unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let sel = Selection::from_dropped([file.clone(), sub.clone()]);
        assert_eq!(sel, Selection::Directory(sub));

        let sel = Selection::from_dropped([file.clone(), tmp.path().join("missing.png")]);
        assert_eq!(sel, Selection::Files(vec![file]));
    }
}
