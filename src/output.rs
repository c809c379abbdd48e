//! Terminal result of a run and the diagnostics attached to it.

use crate::error::{CandidateError, FailureKind, Img2PdfError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The single value a run produces.
///
/// Diagnostics travel with both variants so a caller can show "3 pages
/// written, 1 file skipped" or "failed, and these 2 files were unreadable".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionResult {
    Success {
        output_path: PathBuf,
        diagnostics: Diagnostics,
    },
    Failure {
        kind: FailureKind,
        message: String,
        offending_path: Option<PathBuf>,
        diagnostics: Diagnostics,
    },
}

impl ConversionResult {
    /// Fold a fatal error into a `Failure`.
    pub fn from_error(err: &Img2PdfError, diagnostics: Diagnostics) -> Self {
        ConversionResult::Failure {
            kind: err.kind(),
            message: err.to_string(),
            offending_path: err.offending_path().cloned(),
            diagnostics,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Success { .. })
    }

    /// The written PDF, on success.
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            ConversionResult::Success { output_path, .. } => Some(output_path),
            ConversionResult::Failure { .. } => None,
        }
    }

    /// The failure category, on failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ConversionResult::Success { .. } => None,
            ConversionResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            ConversionResult::Success { diagnostics, .. }
            | ConversionResult::Failure { diagnostics, .. } => diagnostics,
        }
    }
}

/// Everything a caller may want to show besides the headline result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Candidates dropped by validation, in pipeline order.
    pub exclusions: Vec<Exclusion>,
    /// Oversized images (advisory unless strict).
    pub warnings: Vec<OversizeWarning>,
    pub stats: RunStats,
}

/// A file that did not make it into the PDF, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub path: PathBuf,
    pub reason: CandidateError,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// An image at or above the configured pixel ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OversizeWarning {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl OversizeWarning {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for OversizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.path.to_string_lossy());
        write!(f, "{} ({}x{})", name, self.width, self.height)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Paths produced by collection.
    pub candidates: usize,
    /// Candidates that passed validation.
    pub valid: usize,
    /// Pages written (equals `valid` on success).
    pub pages: usize,
    /// Pages whose original encoded bytes were embedded untouched.
    pub embedded_direct: usize,
    /// Pages that needed a lossless re-encode.
    pub reencoded: usize,
    /// Size of the final PDF in bytes (0 on failure).
    pub output_bytes: u64,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_warning_renders_name_and_size() {
        let w = OversizeWarning {
            path: "/scans/poster.png".into(),
            width: 8000,
            height: 6000,
        };
        assert_eq!(w.to_string(), "poster.png (8000x6000)");
        assert_eq!(w.pixels(), 48_000_000);
    }

    #[test]
    fn failure_carries_kind_and_path() {
        let err = Img2PdfError::Assembly {
            path: "b.png".into(),
            detail: "truncated".into(),
        };
        let r = ConversionResult::from_error(&err, Diagnostics::default());
        assert!(!r.is_success());
        assert_eq!(r.failure_kind(), Some(FailureKind::Assembly));
        match r {
            ConversionResult::Failure { offending_path, .. } => {
                assert_eq!(offending_path, Some(PathBuf::from("b.png")));
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn result_serialises_with_status_tag() {
        let r = ConversionResult::Success {
            output_path: "out.pdf".into(),
            diagnostics: Diagnostics::default(),
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"status\":\"success\""), "got: {json}");
        assert_eq!(r.output_path(), Some(Path::new("out.pdf")));
    }
}
