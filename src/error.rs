//! Error types for the imgs2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Img2PdfError`] is **fatal**: the run cannot produce a PDF (nothing was
//!   selected, every candidate was rejected, an image could not be embedded,
//!   the output could not be written, or the caller cancelled).
//!
//! * [`CandidateError`] is **non-fatal**: a single file could not be validated.
//!   It is stored on its [`crate::pipeline::validate::ImageCandidate`] and
//!   reported as an exclusion, while the remaining files carry on.
//!
//! Neither type crosses the orchestration boundary as `Err`: the controller
//! folds fatal errors into [`crate::output::ConversionResult::Failure`] using
//! [`Img2PdfError::kind`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors raised while running a conversion.
#[derive(Debug, Error)]
pub enum Img2PdfError {
    // ── Selection errors ──────────────────────────────────────────────────
    /// Nothing to convert: no files given, or the directory holds no
    /// supported images.
    #[error("No images selected: {reason}")]
    EmptySelection { reason: String },

    /// The selected directory could not be listed.
    #[error("Cannot read directory '{path}': {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Policy errors ─────────────────────────────────────────────────────
    /// Every candidate failed validation.
    #[error("None of the {total} selected files is a readable image")]
    NoValidImages { total: usize },

    /// Strict mode only: an image is at or above the pixel ceiling.
    #[error("'{path}' is {width}x{height} ({pixels} px), limit is {limit} px")]
    ResolutionLimitExceeded {
        path: PathBuf,
        width: u32,
        height: u32,
        pixels: u64,
        limit: u64,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// A single image could not be embedded into the PDF.
    #[error("Failed to embed '{path}': {detail}")]
    Assembly { path: PathBuf, detail: String },

    /// Could not create, write or move the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Run control ───────────────────────────────────────────────────────
    /// The caller cancelled the run between two items.
    #[error("Conversion cancelled")]
    Cancelled,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error (including a panic caught at the boundary).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Img2PdfError {
    /// Classify this error for the terminal [`crate::output::ConversionResult`].
    pub fn kind(&self) -> FailureKind {
        match self {
            Img2PdfError::EmptySelection { .. } | Img2PdfError::DirectoryUnreadable { .. } => {
                FailureKind::EmptySelection
            }
            Img2PdfError::NoValidImages { .. } => FailureKind::NoValidImages,
            Img2PdfError::ResolutionLimitExceeded { .. } => FailureKind::ResolutionLimitExceeded,
            Img2PdfError::Assembly { .. } | Img2PdfError::OutputWriteFailed { .. } => {
                FailureKind::Assembly
            }
            Img2PdfError::Cancelled => FailureKind::Cancelled,
            Img2PdfError::InvalidConfig(_) | Img2PdfError::Internal(_) => FailureKind::Internal,
        }
    }

    /// The file this error is about, when there is one.
    pub fn offending_path(&self) -> Option<&PathBuf> {
        match self {
            Img2PdfError::DirectoryUnreadable { path, .. }
            | Img2PdfError::ResolutionLimitExceeded { path, .. }
            | Img2PdfError::Assembly { path, .. }
            | Img2PdfError::OutputWriteFailed { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Category of a failed run, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EmptySelection,
    NoValidImages,
    ResolutionLimitExceeded,
    Assembly,
    Cancelled,
    Internal,
}

/// A non-fatal error for a single candidate file.
///
/// Stored on the candidate; the run continues with the other files unless
/// none of them is valid.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateError {
    /// The path does not exist or is not a regular file.
    #[error("file not found")]
    NotFound,

    /// The file exists but could not be opened or read.
    #[error("cannot read file: {detail}")]
    Unreadable { detail: String },

    /// The content is not one of the supported raster formats.
    #[error("unsupported format: {detail}")]
    UnsupportedFormat { detail: String },

    /// The header was recognised but is damaged.
    #[error("corrupt image: {detail}")]
    Corrupt { detail: String },

    /// The header declares a zero-sized image.
    #[error("image has zero width or height")]
    ZeroDimensions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_selection_errors() {
        let e = Img2PdfError::DirectoryUnreadable {
            path: "/nope".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(e.kind(), FailureKind::EmptySelection);
        assert_eq!(e.offending_path(), Some(&PathBuf::from("/nope")));
    }

    #[test]
    fn assembly_display_names_file() {
        let e = Img2PdfError::Assembly {
            path: "scan_07.png".into(),
            detail: "PNG has no IDAT chunk".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("scan_07.png"), "got: {msg}");
        assert!(msg.contains("IDAT"), "got: {msg}");
        assert_eq!(e.kind(), FailureKind::Assembly);
    }

    #[test]
    fn cancelled_has_no_offending_path() {
        assert_eq!(Img2PdfError::Cancelled.kind(), FailureKind::Cancelled);
        assert!(Img2PdfError::Cancelled.offending_path().is_none());
    }

    #[test]
    fn candidate_error_serialises_tagged() {
        let e = CandidateError::Corrupt {
            detail: "bad IHDR".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"type\":\"corrupt\""), "got: {json}");
    }
}
