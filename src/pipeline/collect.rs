//! Path collection: turn a [`Selection`] into candidate image paths.
//!
//! Explicit file lists pass through untouched; they are checked later by the
//! validator, which reports unsupported files as exclusions instead of
//! dropping them here. Directory entries are filtered by extension and sorted
//! by path so that everything downstream sees the same input order on every
//! filesystem.

use crate::config::ConversionConfig;
use crate::error::Img2PdfError;
use crate::selection::Selection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve `selection` into a non-empty list of candidate paths.
pub fn collect(
    selection: &Selection,
    config: &ConversionConfig,
) -> Result<Vec<PathBuf>, Img2PdfError> {
    let paths = match selection {
        Selection::Files(files) => {
            if files.is_empty() {
                return Err(Img2PdfError::EmptySelection {
                    reason: "no files were selected".into(),
                });
            }
            files.clone()
        }
        Selection::Directory(dir) => {
            let mut found = Vec::new();
            scan_dir(dir, config, &mut found)?;
            if found.is_empty() {
                return Err(Img2PdfError::EmptySelection {
                    reason: format!(
                        "'{}' contains no {} files",
                        dir.display(),
                        config.extensions.join("/")
                    ),
                });
            }
            found.sort();
            found
        }
    };

    info!("Collected {} candidate paths", paths.len());
    Ok(paths)
}

fn scan_dir(
    dir: &Path,
    config: &ConversionConfig,
    found: &mut Vec<PathBuf>,
) -> Result<(), Img2PdfError> {
    let unreadable = |source| Img2PdfError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(unreadable)?;

        // Symlinked directories are not followed.
        if file_type.is_dir() {
            if config.recursive {
                scan_dir(&path, config, found)?;
            }
            continue;
        }

        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| config.is_supported_extension(e));
        if supported && path.is_file() {
            found.push(path);
        } else {
            debug!("Skipping non-image entry: {}", path.display());
        }
    }
    Ok(())
}
